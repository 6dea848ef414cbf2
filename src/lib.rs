//! Terminal marketplace browser.
//!
//! - [`feed`] keeps a paginated, flicker-free listing feed in sync with the backend
//! - [`backend`] talks to the PostgREST/auth endpoints
//! - [`ui`] is the ratatui front end driving one feed per tab

pub mod app;
pub mod backend;
pub mod config;
pub mod feed;
pub mod listing;
pub mod ui;
pub mod util;
