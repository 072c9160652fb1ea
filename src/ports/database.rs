use uuid::Uuid;

use crate::domain::{
    Event, EventFilter, EventKind, EventSummary, Membership, NewEvent, Profile, ProfileSummary,
    ProfileUpdate,
};

#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort {
    /// Fetch a single event
    ///
    /// Returns [`Error::NotFound`] if no event of this kind has this id.
    async fn get_event(&self, kind: EventKind, event_id: Uuid) -> Result<Event, Error>;
    async fn insert_event(&self, created_by: Uuid, event: NewEvent) -> Result<Event, Error>;
    async fn delete_event(&self, kind: EventKind, event_id: Uuid) -> Result<(), Error>;
    /// Events matching `filter`, each with the number of memberships it currently has
    async fn list_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
    ) -> Result<Vec<EventSummary>, Error>;

    /// Number of memberships for an event
    async fn count_members(&self, kind: EventKind, event_id: Uuid) -> Result<u32, Error>;
    /// Fetch the membership of a user in an event
    ///
    /// Returns [`Error::NotFound`] if the user is not a member.
    async fn get_membership(
        &self,
        kind: EventKind,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, Error>;
    /// Insert a single membership row
    ///
    /// Returns [`Error::Duplicate`] if the row already exists and, for stores enforcing it,
    /// [`Error::CapacityExceeded`] if the event is full.
    async fn insert_membership(&self, membership: Membership) -> Result<(), Error>;
    /// Delete the membership matching `(event_id, user_id)`, if any
    async fn delete_membership(
        &self,
        kind: EventKind,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), Error>;
    /// Profiles of all the members of an event
    async fn list_members(
        &self,
        kind: EventKind,
        event_id: Uuid,
    ) -> Result<Vec<ProfileSummary>, Error>;
    /// Ids of all the events a user is a member of
    async fn list_member_event_ids(
        &self,
        kind: EventKind,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, Error>;

    /// Returns [`Error::NotFound`] if the profile does not exist.
    async fn get_profile(&self, profile_id: Uuid) -> Result<Profile, Error>;
    async fn update_profile(
        &self,
        profile_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Profile, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The lookup matched no row
    ///
    /// This is an expected outcome for single-row fetches and is not a failure of the store.
    #[error("no matching row")]
    NotFound,

    /// A row with the same unique key already exists
    #[error("duplicate row")]
    Duplicate,

    /// The store refused a membership because the event is full
    #[error("event is at capacity")]
    CapacityExceeded,

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
