use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Skill rating of a player, always within `0..=1000`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u16")]
pub struct Rating(u16);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("rating {0} is outside of 0..=1000")]
pub struct RatingOutOfRange(pub i64);

impl Rating {
    pub const MAX: u16 = 1000;

    pub fn new(value: u16) -> Result<Self, RatingOutOfRange> {
        if value > Self::MAX {
            return Err(RatingOutOfRange(value.into()));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u16::try_from(value)
            .map_err(|_| RatingOutOfRange(value))
            .and_then(Rating::new)
    }
}

impl From<Rating> for u16 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Full profile of a user
///
/// The id is the id of the account it belongs to. Profiles are created together with the
/// account, outside of this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub rating: Option<Rating>,
    pub description: Option<String>,
}

impl Profile {
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            rating: self.rating,
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// What other users see of a profile in member lists and event details
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub rating: Option<Rating>,
    pub avatar_url: Option<String>,
}

/// Editable fields of a profile
///
/// `avatar_url` replaces the stored reference; uploading the image itself happens elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub description: String,
    pub rating: Rating,
    pub avatar_url: Option<String>,
}

impl Profile {
    pub fn apply(&mut self, update: ProfileUpdate) {
        self.full_name = Some(update.full_name);
        self.description = Some(update.description);
        self.rating = Some(update.rating);
        // Keep the current avatar unless a new one is provided
        if update.avatar_url.is_some() {
            self.avatar_url = update.avatar_url;
        }
    }
}
