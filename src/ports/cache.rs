use uuid::Uuid;

use crate::domain::{Event, EventKind, EventSummary, Profile, ProfileSummary};

/// Request cache for read models
///
/// Values are never patched after a mutation: the affected keys are invalidated and refetched
/// on the next read.
///
/// Every invalidation starts a new generation. A reader takes the generation before going to
/// the store and hands it back on insert, so a snapshot taken before a mutation is never
/// stored after that mutation invalidated its key.
#[mockall::automock]
pub trait CachePort {
    fn get(&self, key: &QueryKey) -> Option<ReadModel>;
    fn generation(&self) -> u64;
    /// Store a value read at `generation`, returns false if it was dropped as stale
    fn insert(&self, key: QueryKey, value: ReadModel, generation: u64) -> bool;
    fn invalidate(&self, pattern: KeyPattern);
}

/// Key of a cached read model
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// Every event of a kind, with counts
    Events(EventKind),
    /// Single event with its creator
    Event(EventKind, Uuid),
    /// Whether a user is a member of an event
    MembershipStatus {
        kind: EventKind,
        event_id: Uuid,
        user_id: Uuid,
    },
    /// Members of an event
    Members(EventKind, Uuid),
    /// Saved view of a user
    Saved(EventKind, Uuid),
    Profile(Uuid),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadModel {
    Events(Vec<EventSummary>),
    Event(Event, Option<ProfileSummary>),
    MembershipStatus(bool),
    Members(Vec<ProfileSummary>),
    Profile(Profile),
}

/// Set of keys to invalidate
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(QueryKey),
    /// Saved views of every user for a kind
    AllSaved(EventKind),
    /// Membership status of every user for an event
    AllStatuses(EventKind, Uuid),
    /// Member lists of every event
    AllMembers,
    /// Details of every event, not the listings
    AllEventDetails,
}

impl KeyPattern {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match (self, key) {
            (KeyPattern::Exact(expected), key) => expected == key,
            (KeyPattern::AllSaved(kind), QueryKey::Saved(key_kind, _)) => kind == key_kind,
            (
                KeyPattern::AllStatuses(kind, id),
                QueryKey::MembershipStatus {
                    kind: key_kind,
                    event_id,
                    ..
                },
            ) => kind == key_kind && id == event_id,
            (KeyPattern::AllMembers, QueryKey::Members(..)) => true,
            (KeyPattern::AllEventDetails, QueryKey::Event(..)) => true,
            _ => false,
        }
    }
}

impl From<QueryKey> for KeyPattern {
    fn from(key: QueryKey) -> Self {
        KeyPattern::Exact(key)
    }
}
