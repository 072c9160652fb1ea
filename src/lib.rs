//! Organize football matches and tournaments
//!
//! The crate is laid out as ports and adapters:
//!
//! * [`domain`] holds events, memberships, profiles and the caller's [`domain::Session`].
//! * [`ports`] declares what the logic needs from the outside world: a database and a request
//!   cache for read models.
//! * [`adapters`] implements those ports, in memory or against a hosted PostgREST backend.
//! * [`commands`] is the membership coordinator, one `tower::Service` per operation.

pub mod adapters;
pub mod commands;
pub mod config;
pub mod domain;
pub mod ports;
