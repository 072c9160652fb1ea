use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{EventKind, Session},
    ports::{
        cache::{CachePort, KeyPattern, QueryKey},
        database::DatabasePort,
    },
};

use super::{event_not_found, DomainLogic, Error, ServiceFuture};

/// Delete an event, only allowed to its creator
///
/// Memberships of the event go with it through the store's cascade.
pub struct DeleteEventRequest {
    pub session: Session,
    pub kind: EventKind,
    pub event_id: Uuid,
}

impl<D, C> Service<DeleteEventRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = ();
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DeleteEventRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let user_id = req.session.user_id()?;
            let DeleteEventRequest { kind, event_id, .. } = req;

            let event = database
                .get_event(kind, event_id)
                .await
                .map_err(event_not_found(kind, event_id))?;
            if event.created_by != user_id {
                tracing::warn!(%kind, %event_id, %user_id, "refusing delete by non-creator");
                return Err(Error::NotCreator(kind));
            }

            database.delete_event(kind, event_id).await?;

            tracing::info!(%kind, %event_id, "deleted event");
            cache.invalidate(QueryKey::Events(kind).into());
            cache.invalidate(QueryKey::Event(kind, event_id).into());
            cache.invalidate(QueryKey::Members(kind, event_id).into());
            cache.invalidate(KeyPattern::AllStatuses(kind, event_id));
            cache.invalidate(KeyPattern::AllSaved(kind));

            Ok(())
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
            list_events::ListSavedEventsRequest,
            membership_status::MembershipStatusRequest,
            test_support::domain,
        },
        domain::fixtures,
        ports::database::{self, DatabasePort},
    };
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    #[tokio::test]
    async fn test_delete_by_creator() -> Result<(), BoxError> {
        // GIVEN
        // * an event with a member
        // * cached views of that member
        let database = MemoryDatabase::default();
        let creator_id = Uuid::new_v4();
        let member_id = Uuid::new_v4();
        let event = database
            .insert_event(creator_id, fixtures::new_match(10))
            .await?;
        let domain = domain(&database);
        domain
            .clone()
            .oneshot(JoinEventRequest {
                session: Session::authenticated(member_id),
                kind: EventKind::Match,
                event_id: event.id,
            })
            .await?;
        let status = || MembershipStatusRequest {
            kind: EventKind::Match,
            event_id: event.id,
            user_id: member_id,
        };
        let saved = || ListSavedEventsRequest {
            session: Session::authenticated(member_id),
            kind: EventKind::Match,
        };
        assert_that!(domain.clone().oneshot(status()).await).is_ok().is_true();
        assert_that!(domain.clone().oneshot(saved()).await)
            .is_ok()
            .has_length(1);

        // WHEN the creator deletes it
        let res = domain
            .clone()
            .oneshot(DeleteEventRequest {
                session: Session::authenticated(creator_id),
                kind: EventKind::Match,
                event_id: event.id,
            })
            .await;

        // THEN
        // * the event is gone
        // * the memberships are treated as absent everywhere
        assert_that!(res).is_ok();
        assert_that!(database.get_event(EventKind::Match, event.id).await)
            .is_err()
            .matches(|err| matches!(err, database::Error::NotFound));
        assert_that!(domain.clone().oneshot(status()).await).is_ok().is_false();
        assert_that!(domain.clone().oneshot(saved()).await)
            .is_ok()
            .has_length(0);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_by_someone_else() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let event = database
            .insert_event(Uuid::new_v4(), fixtures::new_tournament(4, 2))
            .await?;
        let domain = domain(&database);

        let res = domain
            .oneshot(DeleteEventRequest {
                session: Session::authenticated(Uuid::new_v4()),
                kind: EventKind::Tournament,
                event_id: event.id,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::NotCreator(EventKind::Tournament)));
        assert_that!(database.get_event(EventKind::Tournament, event.id).await).is_ok();

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let domain = domain(&database);

        let res = domain
            .oneshot(DeleteEventRequest {
                session: Session::authenticated(Uuid::new_v4()),
                kind: EventKind::Match,
                event_id: Uuid::new_v4(),
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::EventNotFound { .. }));

        Ok(())
    }
}
