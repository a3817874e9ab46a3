//! # AFW Common Library
//!
//! Shared code for the audit-workflow services including:
//! - Error taxonomy for the data layer
//! - Configuration loading and root folder resolution
//! - Declarative entity specs and the spec registry
//! - Chat message merging
//! - Database initialization and schema synchronization
//! - Realtime event payloads
//! - Time and id helpers

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod spec;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use spec::{Action, EntitySpec, FieldSpec, FieldType, Role, SpecRegistry};
