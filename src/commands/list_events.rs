use std::{
    collections::HashSet,
    task::{Context, Poll},
};

use tower::Service;

use crate::{
    domain::{EventFilter, EventKind, EventSummary, Session},
    ports::{
        cache::{CachePort, QueryKey, ReadModel},
        database::DatabasePort,
    },
};

use super::{DomainLogic, Error, ServiceFuture};

/// Every event of a kind, with its number of members
pub struct ListEventsRequest {
    pub kind: EventKind,
    /// Only keep events whose city contains this text, ignoring case
    pub city: Option<String>,
}

/// Events the user created or joined
pub struct ListSavedEventsRequest {
    pub session: Session,
    pub kind: EventKind,
}

impl<D, C> Service<ListEventsRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = Vec<EventSummary>;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ListEventsRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let key = QueryKey::Events(req.kind);
            let events = match cache.get(&key) {
                Some(ReadModel::Events(events)) => events,
                _ => {
                    let generation = cache.generation();
                    let events = database.list_events(req.kind, EventFilter::All).await?;
                    cache.insert(key, ReadModel::Events(events.clone()), generation);
                    events
                }
            };

            Ok(match req.city {
                Some(city) => events
                    .into_iter()
                    .filter(|event| event.matches_city(&city))
                    .collect(),
                None => events,
            })
        })
    }
}

impl<D, C> Service<ListSavedEventsRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = Vec<EventSummary>;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ListSavedEventsRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let user_id = req.session.user_id()?;
            let key = QueryKey::Saved(req.kind, user_id);
            if let Some(ReadModel::Events(events)) = cache.get(&key) {
                return Ok(events);
            }

            let generation = cache.generation();
            let joined_ids = database.list_member_event_ids(req.kind, user_id).await?;
            let mut events = database
                .list_events(req.kind, EventFilter::saved_by(user_id, joined_ids))
                .await?;
            // Created and joined at the same time shows up once
            let mut seen = HashSet::new();
            events.retain(|event| seen.insert(event.id));

            cache.insert(key, ReadModel::Events(events.clone()), generation);
            Ok(events)
        })
    }
}
