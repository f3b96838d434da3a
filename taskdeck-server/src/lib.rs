//! Taskdeck server library.
//!
//! Exposes the configuration, identity extraction and HTTP router for use in
//! tests and embedding. The router serves the task and dashboard operations
//! as JSON, reading the caller's identity from a trusted header.

pub mod api;
pub mod auth;
pub mod config;
