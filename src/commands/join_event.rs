use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{EventKind, Membership, Session},
    ports::{
        cache::CachePort,
        database::{self, DatabasePort},
    },
};

use super::{event_not_found, invalidate_membership, DomainLogic, Error, ServiceFuture};

pub struct JoinEventRequest {
    pub session: Session,
    pub kind: EventKind,
    pub event_id: Uuid,
}

#[derive(Debug, PartialEq, Eq)]
pub struct JoinEventResponse {
    pub event_id: Uuid,
    /// Number of members right after the join, as counted before inserting
    pub joined_count: u32,
    pub capacity: u32,
}

impl<D, C> Service<JoinEventRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = JoinEventResponse;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: JoinEventRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let user_id = req.session.user_id()?;
            let JoinEventRequest { kind, event_id, .. } = req;

            let event = database
                .get_event(kind, event_id)
                .await
                .map_err(event_not_found(kind, event_id))?;

            // Joining twice is refused before looking at the capacity
            match database.get_membership(kind, event_id, user_id).await {
                Ok(_) => return Err(Error::AlreadyMember(kind)),
                Err(database::Error::NotFound) => {}
                Err(err) => return Err(err.into()),
            }

            // Advisory check: another caller can still slip in between the count and the insert
            let joined_count = database.count_members(kind, event_id).await?;
            if joined_count >= event.capacity {
                tracing::warn!(
                    %kind,
                    %event_id,
                    %user_id,
                    joined_count,
                    capacity = event.capacity,
                    "refusing join, event is full"
                );
                return Err(Error::CapacityExceeded(kind));
            }

            database
                .insert_membership(Membership {
                    kind,
                    event_id,
                    user_id,
                })
                .await
                .map_err(|err| match err {
                    database::Error::Duplicate => Error::AlreadyMember(kind),
                    database::Error::CapacityExceeded => Error::CapacityExceeded(kind),
                    database::Error::NotFound => Error::EventNotFound { kind, event_id },
                    err => err.into(),
                })?;

            tracing::info!(%kind, %event_id, %user_id, "joined event");
            invalidate_membership(cache.as_ref(), kind, event_id, user_id);

            Ok(JoinEventResponse {
                event_id,
                joined_count: joined_count + 1,
                capacity: event.capacity,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{cache::moka::MokaCache, database::memory::MemoryDatabase},
        commands::{
            list_events::ListEventsRequest,
            membership_status::MembershipStatusRequest,
            test_support::{domain, seed_match},
            withdraw::WithdrawRequest,
        },
        domain::fixtures,
        ports::{
            cache::{KeyPattern, MockCachePort, QueryKey},
            database::MockDatabasePort,
        },
    };
    use mockall::predicate::*;
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::{BoxError, ServiceExt};

    fn join(kind: EventKind, event_id: Uuid, user_id: Uuid) -> JoinEventRequest {
        JoinEventRequest {
            session: Session::authenticated(user_id),
            kind,
            event_id,
        }
    }

    #[fixture]
    fn user_id() -> Uuid {
        Uuid::new_v4()
    }

    #[rstest]
    #[tokio::test]
    async fn test_join_then_status(user_id: Uuid) -> Result<(), BoxError> {
        // GIVEN an event with room left
        let database = MemoryDatabase::default();
        let event = seed_match(&database, 10).await;
        let domain = domain(&database);

        // WHEN joining it
        let res = domain
            .clone()
            .oneshot(join(EventKind::Match, event.id, user_id))
            .await;

        // THEN
        // * the join succeeds with the new count
        // * the membership is visible
        assert_that!(res).is_ok().is_equal_to(JoinEventResponse {
            event_id: event.id,
            joined_count: 1,
            capacity: 10,
        });
        let status = domain
            .clone()
            .oneshot(MembershipStatusRequest {
                kind: EventKind::Match,
                event_id: event.id,
                user_id,
            })
            .await;
        assert_that!(status).is_ok().is_true();

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_join_twice(user_id: Uuid) -> Result<(), BoxError> {
        // GIVEN a user that already joined an event
        let database = MemoryDatabase::default();
        let event = seed_match(&database, 10).await;
        let domain = domain(&database);
        domain
            .clone()
            .oneshot(join(EventKind::Match, event.id, user_id))
            .await?;

        // WHEN joining again
        let res = domain
            .clone()
            .oneshot(join(EventKind::Match, event.id, user_id))
            .await;

        // THEN it fails and the count is unchanged
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::AlreadyMember(EventKind::Match)));
        assert_that!(database.count_members(EventKind::Match, event.id).await)
            .is_ok()
            .is_equal_to(1);

        Ok(())
    }

    #[rstest]
    #[case::match_full(fixtures::new_match(3))]
    #[case::tournament_full(fixtures::new_tournament(3, 1))]
    #[tokio::test]
    async fn test_join_full(#[case] new_event: crate::domain::NewEvent) -> Result<(), BoxError> {
        // GIVEN an event whose member list already reached its capacity
        let database = MemoryDatabase::default();
        let kind = new_event.kind();
        let event = database.insert_event(Uuid::new_v4(), new_event).await?;
        let domain = domain(&database);
        for _ in 0..3 {
            domain
                .clone()
                .oneshot(join(kind, event.id, Uuid::new_v4()))
                .await?;
        }

        // WHEN one more user joins
        let res = domain
            .clone()
            .oneshot(join(kind, event.id, Uuid::new_v4()))
            .await;

        // THEN it is refused
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::CapacityExceeded(k) if *k == kind));

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_join_unknown_event(user_id: Uuid) -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let domain = domain(&database);
        let event_id = Uuid::new_v4();

        let res = domain
            .clone()
            .oneshot(join(EventKind::Tournament, event_id, user_id))
            .await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::EventNotFound { kind: EventKind::Tournament, event_id: id } if *id == event_id)
        });

        Ok(())
    }

    #[tokio::test]
    async fn test_join_anonymous() -> Result<(), BoxError> {
        // GIVEN no session, the store must not even be queried
        let database = MockDatabasePort::new();
        let domain = DomainLogic::new(Arc::new(database), Arc::new(MokaCache::default()));

        let res = domain
            .clone()
            .oneshot(JoinEventRequest {
                session: Session::anonymous(),
                kind: EventKind::Match,
                event_id: Uuid::new_v4(),
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::Unauthenticated));

        Ok(())
    }

    /// The creator is not a member of their own event until they join it
    #[rstest]
    #[tokio::test]
    async fn test_creator_joins_own_event(user_id: Uuid) -> Result<(), BoxError> {
        // GIVEN an event created by the user
        let database = MemoryDatabase::default();
        let event = database
            .insert_event(user_id, fixtures::new_match(5))
            .await?;
        let domain = domain(&database);
        assert_that!(database.count_members(EventKind::Match, event.id).await)
            .is_ok()
            .is_equal_to(0);

        // WHEN the creator joins
        let res = domain
            .clone()
            .oneshot(join(EventKind::Match, event.id, user_id))
            .await;

        // THEN they take one of the spots like any other player
        assert_that!(res)
            .is_ok()
            .matches(|res| res.joined_count == 1 && res.capacity == 5);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_join_withdraw_counts(user_id: Uuid) -> Result<(), BoxError> {
        // GIVEN an event with capacity 10 and no members
        let database = MemoryDatabase::default();
        let event = seed_match(&database, 10).await;
        let domain = domain(&database);
        let joined_count = |events: Vec<crate::domain::EventSummary>| {
            events
                .into_iter()
                .find(|summary| summary.id == event.id)
                .map(|summary| summary.joined_count)
        };
        let list = || ListEventsRequest {
            kind: EventKind::Match,
            city: None,
        };

        // WHEN the user joins, THEN the list shows one member
        domain
            .clone()
            .oneshot(join(EventKind::Match, event.id, user_id))
            .await?;
        let events = domain.clone().oneshot(list()).await?;
        assert_that!(joined_count(events)).is_equal_to(Some(1));

        // WHEN the user withdraws, THEN the list is back to zero
        domain
            .clone()
            .oneshot(WithdrawRequest {
                session: Session::authenticated(user_id),
                kind: EventKind::Match,
                event_id: event.id,
            })
            .await?;
        let events = domain.clone().oneshot(list()).await?;
        assert_that!(joined_count(events)).is_equal_to(Some(0));

        Ok(())
    }

    /// A capacity constraint in the store wins over a stale client-side count
    #[rstest]
    #[tokio::test]
    async fn test_store_capacity_violation(user_id: Uuid) -> Result<(), BoxError> {
        // GIVEN a store that reports room left but then refuses the row
        let event_id = Uuid::new_v4();
        let mut database = MockDatabasePort::new();
        database
            .expect_get_event()
            .with(eq(EventKind::Match), eq(event_id))
            .returning(move |_, _| {
                Ok(fixtures::new_match(2).into_event(event_id, Uuid::new_v4()))
            });
        database
            .expect_get_membership()
            .returning(|_, _, _| Err(database::Error::NotFound));
        database.expect_count_members().returning(|_, _| Ok(1));
        database
            .expect_insert_membership()
            .times(1)
            .returning(|_| Err(database::Error::CapacityExceeded));
        let domain = DomainLogic::new(Arc::new(database), Arc::new(MokaCache::default()));

        // WHEN joining
        let res = domain
            .clone()
            .oneshot(join(EventKind::Match, event_id, user_id))
            .await;

        // THEN the store's answer is surfaced
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::CapacityExceeded(EventKind::Match)));

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_store_unavailable(user_id: Uuid) -> Result<(), BoxError> {
        let mut database = MockDatabasePort::new();
        database.expect_get_event().returning(|_, _| {
            Err(database::Error::Adapter(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))))
        });
        let domain = DomainLogic::new(Arc::new(database), Arc::new(MokaCache::default()));

        let res = domain
            .clone()
            .oneshot(join(EventKind::Match, Uuid::new_v4(), user_id))
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::StoreUnavailable(_)));

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_join_invalidates(user_id: Uuid) -> Result<(), BoxError> {
        // GIVEN
        // * a stored tournament with room left
        // * a cache expecting the affected read models to be invalidated
        let database = MemoryDatabase::default();
        let event = database
            .insert_event(Uuid::new_v4(), fixtures::new_tournament(4, 1))
            .await?;
        let kind = EventKind::Tournament;
        let mut cache = MockCachePort::new();
        for pattern in [
            KeyPattern::Exact(QueryKey::Events(kind)),
            KeyPattern::Exact(QueryKey::Event(kind, event.id)),
            KeyPattern::Exact(QueryKey::MembershipStatus {
                kind,
                event_id: event.id,
                user_id,
            }),
            KeyPattern::Exact(QueryKey::Members(kind, event.id)),
            KeyPattern::AllSaved(kind),
        ] {
            cache
                .expect_invalidate()
                .with(eq(pattern))
                .times(1)
                .return_const(());
        }
        let domain = DomainLogic {
            database: Arc::new(database),
            cache: Arc::new(cache),
        };

        // WHEN joining
        domain
            .clone()
            .oneshot(join(kind, event.id, user_id))
            .await?;

        // THEN every expected invalidation happened
        Arc::into_inner(domain.cache).unwrap().checkpoint();

        Ok(())
    }
}
