use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod profile;

pub use profile::{Profile, ProfileSummary, ProfileUpdate, Rating, RatingOutOfRange};

/// The two joinable kinds of event
///
/// Both kinds share the same membership rules. Everything that differs between them on the
/// storage side lives in their [`EventKindDescriptor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Match,
    Tournament,
}

/// Storage layout for one [`EventKind`]
#[derive(Debug, PartialEq, Eq)]
pub struct EventKindDescriptor {
    /// Table holding the event rows
    pub table: &'static str,
    /// Column holding the capacity of the event
    pub capacity_column: &'static str,
    /// Join table linking profiles to events of this kind
    pub membership_table: &'static str,
    /// Foreign key column of the join table pointing at the event
    pub membership_event_column: &'static str,
    /// Column used to order event listings, if any
    pub order_column: Option<&'static str>,
}

const MATCH: EventKindDescriptor = EventKindDescriptor {
    table: "matches",
    capacity_column: "players_needed",
    membership_table: "match_players",
    membership_event_column: "match_id",
    order_column: None,
};

const TOURNAMENT: EventKindDescriptor = EventKindDescriptor {
    table: "tournaments",
    capacity_column: "teams",
    membership_table: "tournament_captains",
    membership_event_column: "tournament_id",
    order_column: Some("start_date"),
};

impl EventKind {
    pub fn descriptor(&self) -> &'static EventKindDescriptor {
        match self {
            EventKind::Match => &MATCH,
            EventKind::Tournament => &TOURNAMENT,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Match => f.write_str("match"),
            EventKind::Tournament => f.write_str("tournament"),
        }
    }
}

/// A match or a tournament as stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub info: String,
    /// Profile that created the event
    ///
    /// Only this profile may delete the event. The creator is not a member of the event unless
    /// they join it like anybody else.
    pub created_by: Uuid,
    /// Maximum number of memberships
    ///
    /// Players for a match, team captains for a tournament. Fixed at creation.
    pub capacity: u32,
    pub details: EventDetails,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }
}

/// Fields that only exist for one kind of event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetails {
    Match,
    Tournament {
        tournament_type: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        /// Free text, e.g. "5+1"
        players_per_team: String,
    },
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetails::Match => EventKind::Match,
            EventDetails::Tournament { .. } => EventKind::Tournament,
        }
    }
}

/// Data needed to create an event
///
/// The creator is not part of it: it always comes from the session of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    pub name: String,
    pub address: String,
    pub city: String,
    pub info: String,
    pub capacity: u32,
    pub details: EventDetails,
}

impl NewEvent {
    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }

    /// Trim every text field and reject events that cannot be joined or displayed
    pub fn normalized(self) -> Result<Self, Cow<'static, str>> {
        let details = match self.details {
            EventDetails::Match => EventDetails::Match,
            EventDetails::Tournament {
                tournament_type,
                start_date,
                end_date,
                players_per_team,
            } => EventDetails::Tournament {
                tournament_type: required("type", tournament_type)?,
                start_date,
                end_date,
                players_per_team: required("players per team", players_per_team)?,
            },
        };

        if self.capacity == 0 {
            return Err(match details {
                EventDetails::Match => "players needed must be greater than zero".into(),
                EventDetails::Tournament { .. } => "teams must be greater than zero".into(),
            });
        }

        Ok(Self {
            name: required("name", self.name)?,
            address: required("address", self.address)?,
            city: required("city", self.city)?,
            info: required("info", self.info)?,
            capacity: self.capacity,
            details,
        })
    }

    pub fn into_event(self, id: Uuid, created_by: Uuid) -> Event {
        Event {
            id,
            name: self.name,
            address: self.address,
            city: self.city,
            info: self.info,
            created_by,
            capacity: self.capacity,
            details: self.details,
        }
    }
}

fn required(field: &'static str, value: String) -> Result<String, Cow<'static, str>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} must not be empty").into());
    }
    Ok(trimmed.to_string())
}

/// List view of an event with its number of memberships
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: Uuid,
    pub kind: EventKind,
    pub name: String,
    pub city: String,
    pub created_by: Uuid,
    pub capacity: u32,
    /// Number of memberships, as aggregated by the store
    pub joined_count: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl EventSummary {
    pub fn from_event(event: &Event, joined_count: u32) -> Self {
        let (start_date, end_date) = match &event.details {
            EventDetails::Match => (None, None),
            EventDetails::Tournament {
                start_date,
                end_date,
                ..
            } => (Some(*start_date), Some(*end_date)),
        };
        Self {
            id: event.id,
            kind: event.kind(),
            name: event.name.clone(),
            city: event.city.clone(),
            created_by: event.created_by,
            capacity: event.capacity,
            joined_count,
            start_date,
            end_date,
        }
    }

    pub fn is_full(&self) -> bool {
        self.joined_count >= self.capacity
    }

    /// Case-insensitive substring search on the city
    ///
    /// An empty (or blank) query matches every event.
    pub fn matches_city(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        self.city.to_lowercase().contains(&query)
    }
}

/// Join row between a profile and an event
///
/// At most one exists per `(event_id, user_id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Membership {
    pub kind: EventKind,
    pub event_id: Uuid,
    pub user_id: Uuid,
}

/// Row filter for event listings
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFilter {
    All,
    /// Events created by `created_by`, or whose id is in `ids`
    CreatedByOrIn { created_by: Uuid, ids: Vec<Uuid> },
}

impl EventFilter {
    /// Filter for the saved view of a user
    pub fn saved_by(user_id: Uuid, joined_ids: Vec<Uuid>) -> Self {
        EventFilter::CreatedByOrIn {
            created_by: user_id,
            ids: joined_ids,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            EventFilter::All => true,
            // An empty id set contributes nothing to the disjunction
            EventFilter::CreatedByOrIn { created_by, ids } => {
                event.created_by == *created_by || ids.contains(&event.id)
            }
        }
    }
}

/// Identity of the caller
///
/// Passed explicitly with every request that acts on behalf of a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<Uuid>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("no authenticated user")]
pub struct Unauthenticated;

impl Session {
    pub fn authenticated(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Result<Uuid, Unauthenticated> {
        self.user_id.ok_or(Unauthenticated)
    }
}
