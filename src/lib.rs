//! BambooHR Timesheet Utility Library
//!
//! BambooHR exposes no public bulk API for time-tracking entries, so this
//! library drives the web app directly: it authenticates against the login
//! flow, keeps the session (CSRF token + expiry) renewed, scrapes the JSON
//! blobs embedded in the HTML pages, and submits or deletes timesheet entries
//! in batches spanning multiple calendar days.

pub mod error;
pub mod helpers;
pub mod models;
pub mod service;

pub use error::BambooError;
pub use service::{TimesheetConfig, TimesheetService};

// Re-export key types for convenience
pub use helpers::session::{Credential, CredentialProvider, SessionManager};
pub use models::bamboo::{CatalogEntry, HourEntry, SessionUser, TimeTrackingMeta, TimesheetDay};
