use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{EventKind, ProfileSummary},
    ports::{
        cache::{CachePort, QueryKey, ReadModel},
        database::DatabasePort,
    },
};

use super::{DomainLogic, Error, ServiceFuture};

pub struct ListMembersRequest {
    pub kind: EventKind,
    pub event_id: Uuid,
}

/// Players of a match or captains of a tournament
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberList {
    /// No particular order is guaranteed
    pub members: Vec<ProfileSummary>,
}

impl MemberList {
    /// Number of members, counted from the list itself
    ///
    /// Between a mutation and the next refetch this can differ from the aggregate shown in
    /// event listings.
    pub fn joined_count(&self) -> u32 {
        self.members.len() as u32
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.members.iter().any(|member| member.id == user_id)
    }
}

impl<D, C> Service<ListMembersRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = MemberList;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ListMembersRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let key = QueryKey::Members(req.kind, req.event_id);
            if let Some(ReadModel::Members(members)) = cache.get(&key) {
                return Ok(MemberList { members });
            }

            let generation = cache.generation();
            let members = database.list_members(req.kind, req.event_id).await?;
            cache.insert(key, ReadModel::Members(members.clone()), generation);

            Ok(MemberList { members })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::memory::MemoryDatabase,
        commands::{
            join_event::JoinEventRequest,
            test_support::{domain, seed_match},
            withdraw::WithdrawRequest,
        },
        domain::{Profile, Rating, Session},
    };
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    #[tokio::test]
    async fn test_list_members() -> Result<(), BoxError> {
        // GIVEN an event joined by a user with a profile
        let database = MemoryDatabase::default();
        let event = seed_match(&database, 10).await;
        let user_id = Uuid::new_v4();
        database.insert_profile(Profile {
            id: user_id,
            full_name: Some("Petra".to_string()),
            avatar_url: Some("https://cdn.example/p.png".to_string()),
            rating: Some(Rating::new(640)?),
            description: Some("Goalkeeper".to_string()),
        })?;
        let domain = domain(&database);
        domain
            .clone()
            .oneshot(JoinEventRequest {
                session: Session::authenticated(user_id),
                kind: EventKind::Match,
                event_id: event.id,
            })
            .await?;

        // WHEN listing the members
        let res = domain
            .clone()
            .oneshot(ListMembersRequest {
                kind: EventKind::Match,
                event_id: event.id,
            })
            .await;

        // THEN the profile summary is listed
        assert_that!(res).is_ok().matches(|list| {
            list.joined_count() == 1
                && list.contains(user_id)
                && list.members[0].rating == Rating::new(640).ok()
                && list.members[0].full_name.as_deref() == Some("Petra")
        });

        Ok(())
    }

    #[tokio::test]
    async fn test_list_refetched_after_withdraw() -> Result<(), BoxError> {
        // GIVEN a cached member list with one member
        let database = MemoryDatabase::default();
        let event = seed_match(&database, 10).await;
        let user_id = Uuid::new_v4();
        let domain = domain(&database);
        domain
            .clone()
            .oneshot(JoinEventRequest {
                session: Session::authenticated(user_id),
                kind: EventKind::Match,
                event_id: event.id,
            })
            .await?;
        let list = || ListMembersRequest {
            kind: EventKind::Match,
            event_id: event.id,
        };
        let before = domain.clone().oneshot(list()).await?;

        // WHEN the member withdraws
        domain
            .clone()
            .oneshot(WithdrawRequest {
                session: Session::authenticated(user_id),
                kind: EventKind::Match,
                event_id: event.id,
            })
            .await?;
        let after = domain.clone().oneshot(list()).await?;

        // THEN the list is not served stale
        assert_that!(before.joined_count()).is_equal_to(1);
        assert_that!(after.joined_count()).is_equal_to(0);

        Ok(())
    }
}
