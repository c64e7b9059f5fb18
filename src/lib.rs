//! Mail Triage — support-email draft generation with human review.

pub mod classify;
pub mod config;
pub mod drafts;
pub mod error;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod retrieval;
pub mod review;
pub mod server;
pub mod store;

pub use error::{Error, Result};
