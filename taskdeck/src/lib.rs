//! `Taskdeck`: user-scoped task tracking core.
//!
//! Layers, leaf to root: [`clock`], [`validate`], [`ratelimit`], [`store`],
//! [`service`] and [`dashboard`]. Only [`store`] touches stored rows; the
//! service and dashboard layers go through [`store::TaskStore`].

pub mod clock;
pub mod dashboard;
pub mod ratelimit;
pub mod service;
pub mod store;
pub mod validate;
