//! Environment configuration
//!
//! Values are read from the process environment. The binary loads a `.env` file first, so
//! the same variables can live there during development.

use std::{borrow::Cow, time::Duration};

const REST_URL: &str = "MATCHDAY_REST_URL";
const ANON_KEY: &str = "MATCHDAY_ANON_KEY";
const ACCESS_TOKEN: &str = "MATCHDAY_ACCESS_TOKEN";
const CACHE_CAPACITY: &str = "MATCHDAY_CACHE_CAPACITY";
const CACHE_TTL_SECS: &str = "MATCHDAY_CACHE_TTL_SECS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
}

/// Connection settings for the hosted backend
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://<project>.supabase.co`
    pub url: String,
    /// Public API key sent with every request
    pub anon_key: String,
    /// JWT of the signed-in user
    ///
    /// Requests fall back to the anonymous key when missing, in which case row level security
    /// decides what is visible.
    pub access_token: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1000,
            time_to_live: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} env var not set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        name: &'static str,
        reason: Cow<'static, str>,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(Error::Missing(name))
        };
        let number = |name: &'static str, default: u64| match lookup(name) {
            None => Ok(default),
            Some(value) => value.trim().parse::<u64>().map_err(|err| Error::Invalid {
                name,
                reason: err.to_string().into(),
            }),
        };

        let url = required(REST_URL)?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Invalid {
                name: REST_URL,
                reason: "expected an http(s) URL".into(),
            });
        }

        let defaults = CacheConfig::default();

        Ok(Self {
            backend: BackendConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key: required(ANON_KEY)?,
                access_token: lookup(ACCESS_TOKEN).filter(|token| !token.is_empty()),
            },
            cache: CacheConfig {
                max_capacity: number(CACHE_CAPACITY, defaults.max_capacity)?,
                time_to_live: Duration::from_secs(number(
                    CACHE_TTL_SECS,
                    defaults.time_to_live.as_secs(),
                )?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speculoos::prelude::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let res = Config::from_lookup(lookup(&[
            (REST_URL, "https://project.supabase.co/"),
            (ANON_KEY, "anon"),
        ]));

        assert_that!(res).is_ok().is_equal_to(Config {
            backend: BackendConfig {
                url: "https://project.supabase.co".to_string(),
                anon_key: "anon".to_string(),
                access_token: None,
            },
            cache: CacheConfig::default(),
        });
    }

    #[test]
    fn test_overrides() {
        let res = Config::from_lookup(lookup(&[
            (REST_URL, "http://localhost:54321"),
            (ANON_KEY, "anon"),
            (ACCESS_TOKEN, "jwt"),
            (CACHE_CAPACITY, "50"),
            (CACHE_TTL_SECS, "5"),
        ]));

        assert_that!(res).is_ok().matches(|config| {
            config.backend.access_token.as_deref() == Some("jwt")
                && config.cache.max_capacity == 50
                && config.cache.time_to_live == Duration::from_secs(5)
        });
    }

    #[test]
    fn test_missing_key() {
        let res = Config::from_lookup(lookup(&[(REST_URL, "https://project.supabase.co")]));

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::Missing(ANON_KEY)));
    }

    #[test]
    fn test_invalid_values() {
        let res = Config::from_lookup(lookup(&[(REST_URL, "project.supabase.co"), (ANON_KEY, "k")]));
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::Invalid { name: REST_URL, .. }));

        let res = Config::from_lookup(lookup(&[
            (REST_URL, "https://project.supabase.co"),
            (ANON_KEY, "k"),
            (CACHE_TTL_SECS, "soon"),
        ]));
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::Invalid { name: CACHE_TTL_SECS, .. }));
    }
}
