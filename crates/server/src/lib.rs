//! Game result collector service.
//!
//! A fixed-interval [`scheduler`] drives [`collector::Collector`] cycles that
//! fetch the latest results from upstream and merge them into the shared
//! history store. The [`router`] serves that history to a single trusted
//! consumer holding the `X-API-Key` secret.

pub mod api;
pub mod auth;
pub mod cli;
pub mod collector;
pub mod router;
pub mod scheduler;
pub mod startup;
pub mod state;

pub use router::build_router;
pub use state::{AppState, SharedStore};
