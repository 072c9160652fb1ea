use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{EventKind, Session},
    ports::{cache::CachePort, database::DatabasePort},
};

use super::{invalidate_membership, DomainLogic, Error, ServiceFuture};

/// Leave an event
///
/// Withdrawing is a delete by `(event_id, user_id)`: withdrawing from an event the user is not
/// a member of, or that does not exist anymore, succeeds without changing anything.
pub struct WithdrawRequest {
    pub session: Session,
    pub kind: EventKind,
    pub event_id: Uuid,
}

impl<D, C> Service<WithdrawRequest> for DomainLogic<D, C>
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

    fn call(&mut self, req: WithdrawRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let user_id = req.session.user_id()?;

            database
                .delete_membership(req.kind, req.event_id, user_id)
                .await?;

            tracing::info!(kind = %req.kind, event_id = %req.event_id, %user_id, "withdrew from event");
            invalidate_membership(cache.as_ref(), req.kind, req.event_id, user_id);

            Ok(())
        })
    }
}
