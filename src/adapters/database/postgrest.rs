//! Adapter for a PostgREST API, such as the one exposed by Supabase
//!
//! Filters follow the PostgREST query grammar (`column=eq.value`, `or=(...)`), embedded
//! resources are used for the membership count aggregate and for member profiles.

use chrono::NaiveDate;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{
    config::BackendConfig,
    domain::{
        Event, EventDetails, EventFilter, EventKind, EventSummary, Membership, NewEvent, Profile,
        ProfileSummary, ProfileUpdate, Rating,
    },
    ports::database::{DatabasePort, Error},
};

/// Media type asking PostgREST for a single object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const PROFILE_COLUMNS: &str = "id,full_name,rating,avatar_url";
/// SQLSTATE of a foreign key violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone, Debug)]
pub struct PostgrestDatabase {
    client: reqwest::Client,
    rest_url: String,
    anon_key: String,
    bearer: String,
}

impl PostgrestDatabase {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_url: format!("{}/rest/v1", config.url),
            anon_key: config.anon_key.clone(),
            bearer: config
                .access_token
                .clone()
                .unwrap_or_else(|| config.anon_key.clone()),
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = map_error(status, &body);
        tracing::debug!(%status, ?err, "backend request failed");
        Err(err)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Error> {
        Ok(self.send(request).await?.json::<T>().await?)
    }
}

#[async_trait::async_trait]
impl DatabasePort for PostgrestDatabase {
    async fn get_event(&self, kind: EventKind, event_id: Uuid) -> Result<Event, Error> {
        let request = self
            .request(Method::GET, kind.descriptor().table)
            .query(&[("select", "*".to_string()), ("id", eq(event_id))])
            .header(header::ACCEPT, SINGLE_OBJECT);
        let row: EventRow = self.fetch(request).await?;
        row.into_event(kind)
    }

    async fn insert_event(&self, created_by: Uuid, event: NewEvent) -> Result<Event, Error> {
        let kind = event.kind();
        let request = self
            .request(Method::POST, kind.descriptor().table)
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&insert_event_body(created_by, &event));
        let row: EventRow = self.fetch(request).await?;
        row.into_event(kind)
    }

    async fn delete_event(&self, kind: EventKind, event_id: Uuid) -> Result<(), Error> {
        let request = self
            .request(Method::DELETE, kind.descriptor().table)
            .query(&[("id", eq(event_id))]);
        self.send(request).await?;
        Ok(())
    }

    async fn list_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
    ) -> Result<Vec<EventSummary>, Error> {
        let descriptor = kind.descriptor();
        let mut query = vec![("select", list_select(kind))];
        if let Some(or) = or_filter(&filter) {
            query.push(("or", or));
        }
        if let Some(column) = descriptor.order_column {
            query.push(("order", format!("{column}.asc")));
        }

        let request = self.request(Method::GET, descriptor.table).query(&query);
        let rows: Vec<EventRow> = self.fetch(request).await?;
        rows.into_iter().map(|row| row.into_summary(kind)).collect()
    }

    async fn count_members(&self, kind: EventKind, event_id: Uuid) -> Result<u32, Error> {
        let descriptor = kind.descriptor();
        let request = self
            .request(Method::HEAD, descriptor.membership_table)
            .query(&[
                ("select", "user_id".to_string()),
                (descriptor.membership_event_column, eq(event_id)),
            ])
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_total)
            .ok_or_else(|| adapter_error("missing or malformed Content-Range header"))
    }

    async fn get_membership(
        &self,
        kind: EventKind,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, Error> {
        let descriptor = kind.descriptor();
        let request = self
            .request(Method::GET, descriptor.membership_table)
            .query(&[
                ("select", "user_id".to_string()),
                (descriptor.membership_event_column, eq(event_id)),
                ("user_id", eq(user_id)),
            ])
            .header(header::ACCEPT, SINGLE_OBJECT);
        // Zero rows comes back as PGRST116, which maps to `NotFound`
        let _: Value = self.fetch(request).await?;

        Ok(Membership {
            kind,
            event_id,
            user_id,
        })
    }

    async fn insert_membership(&self, membership: Membership) -> Result<(), Error> {
        let descriptor = membership.kind.descriptor();
        let mut body = json!({ "user_id": membership.user_id });
        body[descriptor.membership_event_column] = json!(membership.event_id);
        let request = self
            .request(Method::POST, descriptor.membership_table)
            .json(&body);
        self.send(request).await.map_err(missing_event)?;
        Ok(())
    }

    async fn delete_membership(
        &self,
        kind: EventKind,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), Error> {
        let descriptor = kind.descriptor();
        let request = self
            .request(Method::DELETE, descriptor.membership_table)
            .query(&[
                (descriptor.membership_event_column, eq(event_id)),
                ("user_id", eq(user_id)),
            ]);
        self.send(request).await?;
        Ok(())
    }

    async fn list_members(
        &self,
        kind: EventKind,
        event_id: Uuid,
    ) -> Result<Vec<ProfileSummary>, Error> {
        let descriptor = kind.descriptor();
        let request = self
            .request(Method::GET, descriptor.membership_table)
            .query(&[
                ("select", format!("user_id,profiles({PROFILE_COLUMNS})")),
                (descriptor.membership_event_column, eq(event_id)),
            ]);
        let rows: Vec<MemberRow> = self.fetch(request).await?;

        Ok(rows.into_iter().map(MemberRow::into_summary).collect())
    }

    async fn list_member_event_ids(
        &self,
        kind: EventKind,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, Error> {
        let descriptor = kind.descriptor();
        let request = self
            .request(Method::GET, descriptor.membership_table)
            .query(&[
                ("select", descriptor.membership_event_column.to_string()),
                ("user_id", eq(user_id)),
            ]);
        let rows: Vec<Map<String, Value>> = self.fetch(request).await?;

        rows.into_iter()
            .map(|row| {
                row.get(descriptor.membership_event_column)
                    .and_then(Value::as_str)
                    .and_then(|id| Uuid::parse_str(id).ok())
                    .ok_or_else(|| adapter_error("membership row without a valid event id"))
            })
            .collect()
    }

    async fn get_profile(&self, profile_id: Uuid) -> Result<Profile, Error> {
        let request = self
            .request(Method::GET, "profiles")
            .query(&[("select", "*".to_string()), ("id", eq(profile_id))])
            .header(header::ACCEPT, SINGLE_OBJECT);
        let row: ProfileRow = self.fetch(request).await?;
        Ok(row.into_profile())
    }

    async fn update_profile(
        &self,
        profile_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Profile, Error> {
        let mut body = json!({
            "full_name": update.full_name,
            "description": update.description,
            "rating": update.rating,
        });
        if let Some(avatar_url) = update.avatar_url {
            body["avatar_url"] = Value::String(avatar_url);
        }

        let request = self
            .request(Method::PATCH, "profiles")
            .query(&[("id", eq(profile_id))])
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&body);
        let row: ProfileRow = self.fetch(request).await?;
        Ok(row.into_profile())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Columns for event listings, with the membership count aggregate
fn list_select(kind: EventKind) -> String {
    let descriptor = kind.descriptor();
    let mut select = format!(
        "id,name,city,created_by,{},{}(count)",
        descriptor.capacity_column, descriptor.membership_table
    );
    if kind == EventKind::Tournament {
        select.push_str(",start_date,end_date");
    }
    select
}

/// Value of the `or` query parameter for a filter
///
/// An empty id set is left out entirely: `id.in.()` is not valid PostgREST syntax, and the
/// saved view of a user without memberships is exactly the events they created.
fn or_filter(filter: &EventFilter) -> Option<String> {
    match filter {
        EventFilter::All => None,
        EventFilter::CreatedByOrIn { created_by, ids } if ids.is_empty() => {
            Some(format!("(created_by.eq.{created_by})"))
        }
        EventFilter::CreatedByOrIn { created_by, ids } => {
            let ids = ids
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(",");
            Some(format!("(created_by.eq.{created_by},id.in.({ids}))"))
        }
    }
}

fn insert_event_body(created_by: Uuid, event: &NewEvent) -> Value {
    let mut body = json!({
        "name": event.name,
        "address": event.address,
        "city": event.city,
        "info": event.info,
        "created_by": created_by,
    });
    body[event.kind().descriptor().capacity_column] = event.capacity.into();
    if let EventDetails::Tournament {
        tournament_type,
        start_date,
        end_date,
        players_per_team,
    } = &event.details
    {
        body["type"] = tournament_type.as_str().into();
        body["start_date"] = start_date.to_string().into();
        body["end_date"] = end_date.to_string().into();
        body["players_per_team"] = players_per_team.as_str().into();
    }
    body
}

/// Total from a `Content-Range` header, e.g. `0-24/57` or `*/0`
fn parse_total(content_range: &str) -> Option<u32> {
    content_range.rsplit_once('/')?.1.trim().parse().ok()
}

/// Error body returned by PostgREST
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("backend returned {status}: {code} {message}")]
pub struct PostgrestError {
    status: StatusCode,
    code: String,
    message: String,
}

fn map_error(status: StatusCode, body: &str) -> Error {
    let api_error: ApiError = serde_json::from_str(body).unwrap_or_default();
    match api_error.code.as_deref() {
        // The single-object request matched no rows
        Some("PGRST116") => Error::NotFound,
        // unique_violation
        Some("23505") => Error::Duplicate,
        // check_violation, raised by a capacity constraint on the join tables
        Some("23514") => Error::CapacityExceeded,
        code => Error::Adapter(Box::new(PostgrestError {
            status,
            code: code.unwrap_or_default().to_string(),
            message: api_error.message.unwrap_or_else(|| body.to_string()),
        })),
    }
}

/// A membership row referencing an event that does not exist (anymore)
///
/// Only meaningful for inserts into the join tables. Elsewhere a foreign key violation is a
/// refusal of the store and stays an adapter error.
fn missing_event(err: Error) -> Error {
    match err {
        Error::Adapter(source)
            if source
                .downcast_ref::<PostgrestError>()
                .is_some_and(|err| err.code == FOREIGN_KEY_VIOLATION) =>
        {
            Error::NotFound
        }
        err => err,
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected response: {0}")]
pub struct UnexpectedResponse(&'static str);

fn adapter_error(reason: &'static str) -> Error {
    Error::Adapter(Box::new(UnexpectedResponse(reason)))
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Adapter(Box::new(err))
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u32,
}

/// Row of `matches` or `tournaments`
///
/// Listings only select a subset of the columns, hence the optional fields.
#[derive(Debug, Deserialize)]
struct EventRow {
    id: Uuid,
    name: String,
    address: Option<String>,
    city: String,
    info: Option<String>,
    created_by: Uuid,
    #[serde(alias = "players_needed", alias = "teams")]
    capacity: u32,
    #[serde(rename = "type")]
    tournament_type: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    players_per_team: Option<String>,
    #[serde(alias = "match_players", alias = "tournament_captains", default)]
    members: Vec<CountRow>,
}

impl EventRow {
    fn into_event(self, kind: EventKind) -> Result<Event, Error> {
        let details = match kind {
            EventKind::Match => EventDetails::Match,
            EventKind::Tournament => EventDetails::Tournament {
                tournament_type: self.tournament_type.unwrap_or_default(),
                start_date: self
                    .start_date
                    .ok_or_else(|| adapter_error("tournament without start_date"))?,
                end_date: self
                    .end_date
                    .ok_or_else(|| adapter_error("tournament without end_date"))?,
                players_per_team: self.players_per_team.unwrap_or_default(),
            },
        };

        Ok(Event {
            id: self.id,
            name: self.name,
            address: self.address.unwrap_or_default(),
            city: self.city,
            info: self.info.unwrap_or_default(),
            created_by: self.created_by,
            capacity: self.capacity,
            details,
        })
    }

    fn into_summary(self, kind: EventKind) -> Result<EventSummary, Error> {
        Ok(EventSummary {
            id: self.id,
            kind,
            name: self.name,
            city: self.city,
            created_by: self.created_by,
            capacity: self.capacity,
            // The aggregate comes back as a one element array
            joined_count: self.members.first().map(|row| row.count).unwrap_or(0),
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: Uuid,
    full_name: Option<String>,
    avatar_url: Option<String>,
    rating: Option<i64>,
    description: Option<String>,
}

impl ProfileRow {
    fn into_profile(self) -> Profile {
        let rating = self.rating.and_then(|value| match Rating::try_from(value) {
            Ok(rating) => Some(rating),
            Err(err) => {
                tracing::warn!(profile_id = %self.id, %err, "ignoring stored rating");
                None
            }
        });

        Profile {
            id: self.id,
            full_name: self.full_name,
            avatar_url: self.avatar_url,
            rating,
            description: self.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MemberRow {
    user_id: Uuid,
    profiles: Option<ProfileRow>,
}

impl MemberRow {
    fn into_summary(self) -> ProfileSummary {
        match self.profiles {
            Some(profile) => profile.into_profile().summary(),
            None => ProfileSummary {
                id: self.user_id,
                full_name: None,
                rating: None,
                avatar_url: None,
            },
        }
    }
}
