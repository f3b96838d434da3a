//! Shared data model for `Taskdeck`.
//!
//! Everything that crosses a crate boundary lives here: the stored task
//! entity, its identifiers and enumerations, and the request/response
//! payloads exchanged with the service layer.

pub mod api;
pub mod task;
