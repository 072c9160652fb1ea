use std::{borrow::Cow, future::Future, pin::Pin, sync::Arc};

use uuid::Uuid;

use crate::{
    domain::{EventKind, Unauthenticated},
    ports::{
        cache::{CachePort, KeyPattern, QueryKey},
        database,
    },
};

pub mod create_event;
pub mod delete_event;
pub mod get_event;
pub mod join_event;
pub mod list_events;
pub mod list_members;
pub mod membership_status;
pub mod profile;
pub mod withdraw;

/// Membership coordinator
///
/// Every operation is a [`tower::Service`] over its own request type. Reads go through the
/// cache, writes go to the database and invalidate the read models they affect.
pub struct DomainLogic<D, C> {
    database: Arc<D>,
    cache: Arc<C>,
}

impl<D, C> DomainLogic<D, C> {
    pub fn new(database: Arc<D>, cache: Arc<C>) -> Self {
        Self { database, cache }
    }
}

impl<D, C> Clone for DomainLogic<D, C> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            cache: self.cache.clone(),
        }
    }
}

type ServiceFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>>>>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not signed in")]
    Unauthenticated,
    #[error("{kind} {event_id} does not exist")]
    EventNotFound { kind: EventKind, event_id: Uuid },
    #[error("profile {0} does not exist")]
    ProfileNotFound(Uuid),
    #[error("already a member of this {0}")]
    AlreadyMember(EventKind),
    /// The event is full
    ///
    /// Raised by the client-side check or by a store-side constraint. The client-side check
    /// alone does not prevent concurrent joins from overfilling an event.
    #[error("this {0} is full")]
    CapacityExceeded(EventKind),
    #[error("only the creator can delete this {0}")]
    NotCreator(EventKind),
    #[error("invalid input: {0}")]
    InvalidInput(Cow<'static, str>),
    /// The store could not be reached or failed to answer
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// A lookup matched no row where one was required
    #[error("not found")]
    NotFound,
}

impl From<database::Error> for Error {
    fn from(err: database::Error) -> Self {
        match err {
            database::Error::NotFound => Error::NotFound,
            database::Error::Adapter(err) => Error::StoreUnavailable(err),
            // Only the membership commands can hit these and they map them with the event kind
            database::Error::Duplicate | database::Error::CapacityExceeded => {
                Error::StoreUnavailable(Box::new(err))
            }
        }
    }
}

impl From<Unauthenticated> for Error {
    fn from(_: Unauthenticated) -> Self {
        Error::Unauthenticated
    }
}

/// Map a failed event lookup to [`Error::EventNotFound`]
fn event_not_found(kind: EventKind, event_id: Uuid) -> impl FnOnce(database::Error) -> Error {
    move |err| match err {
        database::Error::NotFound => Error::EventNotFound { kind, event_id },
        err => err.into(),
    }
}

/// Read models affected by a membership change of `user_id` in an event
fn invalidate_membership<C: CachePort>(cache: &C, kind: EventKind, event_id: Uuid, user_id: Uuid) {
    cache.invalidate(QueryKey::Events(kind).into());
    cache.invalidate(QueryKey::Event(kind, event_id).into());
    cache.invalidate(
        QueryKey::MembershipStatus {
            kind,
            event_id,
            user_id,
        }
        .into(),
    );
    cache.invalidate(QueryKey::Members(kind, event_id).into());
    // Counts show up in everybody's saved view
    cache.invalidate(KeyPattern::AllSaved(kind));
}
