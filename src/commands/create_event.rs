use std::task::{Context, Poll};

use tower::Service;

use crate::{
    domain::{Event, NewEvent, Session},
    ports::{
        cache::{CachePort, KeyPattern, QueryKey},
        database::DatabasePort,
    },
};

use super::{DomainLogic, Error, ServiceFuture};

pub struct CreateEventRequest {
    pub session: Session,
    pub event: NewEvent,
}

impl<D, C> Service<CreateEventRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = Event;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateEventRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let user_id = req.session.user_id()?;
            let new_event = req.event.normalized().map_err(Error::InvalidInput)?;
            let kind = new_event.kind();

            // The creator is not inserted as a member
            let event = database.insert_event(user_id, new_event).await?;

            tracing::info!(%kind, event_id = %event.id, created_by = %user_id, "created event");
            cache.invalidate(QueryKey::Events(kind).into());
            cache.invalidate(KeyPattern::AllSaved(kind));

            Ok(event)
        })
    }
}
