use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::EventKind,
    ports::{
        cache::{CachePort, QueryKey, ReadModel},
        database::{self, DatabasePort},
    },
};

use super::{DomainLogic, Error, ServiceFuture};

/// Whether a user is a member of an event
pub struct MembershipStatusRequest {
    pub kind: EventKind,
    pub event_id: Uuid,
    pub user_id: Uuid,
}

impl<D, C> Service<MembershipStatusRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = bool;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: MembershipStatusRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let key = QueryKey::MembershipStatus {
                kind: req.kind,
                event_id: req.event_id,
                user_id: req.user_id,
            };
            if let Some(ReadModel::MembershipStatus(joined)) = cache.get(&key) {
                return Ok(joined);
            }

            let generation = cache.generation();
            // No row is a definite answer, anything else is a failure of the store
            let joined = match database
                .get_membership(req.kind, req.event_id, req.user_id)
                .await
            {
                Ok(_) => true,
                Err(database::Error::NotFound) => false,
                Err(err) => return Err(err.into()),
            };

            cache.insert(key, ReadModel::MembershipStatus(joined), generation);
            Ok(joined)
        })
    }
}
