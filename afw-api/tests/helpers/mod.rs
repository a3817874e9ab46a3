//! Test helpers for afw-api integration tests
//!
//! - TestApp: router over an in-memory database with one session per role
//! - request builders and JSON body extraction

#![allow(dead_code)]

pub mod test_app;

pub use test_app::{extract_json, json_request, request, TestApp};
