use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Event, EventKind, ProfileSummary},
    ports::{
        cache::{CachePort, QueryKey, ReadModel},
        database::{self, DatabasePort},
    },
};

use super::{event_not_found, DomainLogic, Error, ServiceFuture};

pub struct GetEventRequest {
    pub kind: EventKind,
    pub event_id: Uuid,
}

/// Detail view of an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventView {
    pub event: Event,
    /// `None` when the creator has no profile row
    pub creator: Option<ProfileSummary>,
}

impl EventView {
    pub fn is_created_by(&self, user_id: Uuid) -> bool {
        self.event.created_by == user_id
    }
}

impl<D, C> Service<GetEventRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = EventView;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetEventRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let GetEventRequest { kind, event_id } = req;
            let key = QueryKey::Event(kind, event_id);
            if let Some(ReadModel::Event(event, creator)) = cache.get(&key) {
                return Ok(EventView { event, creator });
            }

            let generation = cache.generation();
            let event = database
                .get_event(kind, event_id)
                .await
                .map_err(event_not_found(kind, event_id))?;
            let creator = match database.get_profile(event.created_by).await {
                Ok(profile) => Some(profile.summary()),
                Err(database::Error::NotFound) => None,
                Err(err) => return Err(err.into()),
            };

            cache.insert(key, ReadModel::Event(event.clone(), creator.clone()), generation);
            Ok(EventView { event, creator })
        })
    }
}
