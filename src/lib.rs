//! Import ANA Pay usage notifications from Gmail into a Google spreadsheet.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod google;
pub mod mail;
pub mod parse;
pub mod pipeline;
pub mod retry;
pub mod sheets;

pub use domain::{PaymentRecord, Query, RawMessage};
pub use error::ServiceError;
pub use pipeline::{Pipeline, RunSummary};
