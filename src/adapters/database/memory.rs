use crate::{
    domain::{
        Event, EventFilter, EventKind, EventSummary, Membership, NewEvent, Profile,
        ProfileSummary, ProfileUpdate,
    },
    ports::database::{DatabasePort, Error},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

/// In-process store
///
/// Behaves like the remote store with a unique index on `(event_id, user_id)` and cascading
/// deletes from events to memberships. The capacity check constraint is opt-in through
/// [`MemoryDatabase::with_capacity_constraint`].
#[derive(Clone, Debug)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    capacity_constraint: bool,
}

#[derive(Debug, Default)]
struct Tables {
    /// Events in insertion order
    events: Vec<Event>,
    /// Memberships in insertion order
    memberships: Vec<Membership>,
    profiles: HashMap<Uuid, Profile>,
}

impl Tables {
    fn event(&self, kind: EventKind, event_id: Uuid) -> Option<&Event> {
        self.events
            .iter()
            .find(|event| event.id == event_id && event.kind() == kind)
    }

    fn count_members(&self, kind: EventKind, event_id: Uuid) -> u32 {
        self.memberships
            .iter()
            .filter(|m| m.kind == kind && m.event_id == event_id)
            .count() as u32
    }
}

impl MemoryDatabase {
    /// Store that also refuses memberships beyond the capacity of the event
    ///
    /// The check and the insert happen under the same lock, so concurrent joins cannot overfill
    /// an event.
    pub fn with_capacity_constraint() -> Self {
        Self {
            capacity_constraint: true,
            ..Self::default()
        }
    }

    /// Create the profile of a freshly signed-up account
    pub fn insert_profile(&self, profile: Profile) -> Result<(), Error> {
        self.tables.lock()?.profiles.insert(profile.id, profile);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn get_event(&self, kind: EventKind, event_id: Uuid) -> Result<Event, Error> {
        self.tables
            .lock()?
            .event(kind, event_id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn insert_event(&self, created_by: Uuid, event: NewEvent) -> Result<Event, Error> {
        let event = event.into_event(Uuid::new_v4(), created_by);
        self.tables.lock()?.events.push(event.clone());
        Ok(event)
    }

    async fn delete_event(&self, kind: EventKind, event_id: Uuid) -> Result<(), Error> {
        let mut tables = self.tables.lock()?;
        tables
            .events
            .retain(|event| !(event.id == event_id && event.kind() == kind));
        // Cascade to the join table
        tables
            .memberships
            .retain(|m| !(m.kind == kind && m.event_id == event_id));
        Ok(())
    }

    async fn list_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
    ) -> Result<Vec<EventSummary>, Error> {
        let tables = self.tables.lock()?;
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|event| event.kind() == kind && filter.matches(event))
            .map(|event| EventSummary::from_event(event, tables.count_members(kind, event.id)))
            .collect();

        if kind.descriptor().order_column.is_some() {
            events.sort_by_key(|event| event.start_date);
        }

        Ok(events)
    }

    async fn count_members(&self, kind: EventKind, event_id: Uuid) -> Result<u32, Error> {
        Ok(self.tables.lock()?.count_members(kind, event_id))
    }

    async fn get_membership(
        &self,
        kind: EventKind,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, Error> {
        let membership = Membership {
            kind,
            event_id,
            user_id,
        };
        if self.tables.lock()?.memberships.contains(&membership) {
            Ok(membership)
        } else {
            Err(Error::NotFound)
        }
    }

    async fn insert_membership(&self, membership: Membership) -> Result<(), Error> {
        let mut tables = self.tables.lock()?;
        // Foreign key to the event table
        let capacity = tables
            .event(membership.kind, membership.event_id)
            .map(|event| event.capacity)
            .ok_or(Error::NotFound)?;
        // Unique index on (event_id, user_id)
        if tables.memberships.contains(&membership) {
            return Err(Error::Duplicate);
        }
        if self.capacity_constraint
            && tables.count_members(membership.kind, membership.event_id) >= capacity
        {
            return Err(Error::CapacityExceeded);
        }

        tables.memberships.push(membership);
        Ok(())
    }

    async fn delete_membership(
        &self,
        kind: EventKind,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), Error> {
        self.tables
            .lock()?
            .memberships
            .retain(|m| !(m.kind == kind && m.event_id == event_id && m.user_id == user_id));
        Ok(())
    }

    async fn list_members(
        &self,
        kind: EventKind,
        event_id: Uuid,
    ) -> Result<Vec<ProfileSummary>, Error> {
        let tables = self.tables.lock()?;
        let members = tables
            .memberships
            .iter()
            .filter(|m| m.kind == kind && m.event_id == event_id)
            .map(|m| match tables.profiles.get(&m.user_id) {
                Some(profile) => profile.summary(),
                // Memberships of accounts without a profile row still count
                None => ProfileSummary {
                    id: m.user_id,
                    full_name: None,
                    rating: None,
                    avatar_url: None,
                },
            })
            .collect();

        Ok(members)
    }

    async fn list_member_event_ids(
        &self,
        kind: EventKind,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, Error> {
        let ids = self
            .tables
            .lock()?
            .memberships
            .iter()
            .filter(|m| m.kind == kind && m.user_id == user_id)
            .map(|m| m.event_id)
            .collect();

        Ok(ids)
    }

    async fn get_profile(&self, profile_id: Uuid) -> Result<Profile, Error> {
        self.tables
            .lock()?
            .profiles
            .get(&profile_id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn update_profile(
        &self,
        profile_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Profile, Error> {
        let mut tables = self.tables.lock()?;
        let profile = tables.profiles.get_mut(&profile_id).ok_or(Error::NotFound)?;
        profile.apply(update);
        Ok(profile.clone())
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            capacity_constraint: false,
        }
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
