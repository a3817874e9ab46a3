//! HTTP API handlers for afw-api

pub mod auth;
pub mod chat;
pub mod context;
pub mod entity;
pub mod health;
pub mod react;
pub mod sse;

pub use auth::session_middleware;
pub use chat::{get_chat, post_chat};
pub use entity::{create_record, delete_record, get_record, list_records, patch_record, replace_record};
pub use health::health_routes;
pub use react::toggle_reaction;
pub use sse::event_stream;
