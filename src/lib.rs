//! Raster import tracking against a REST backend.
//!
//! [`tracker::ImportTracker`] submits imports, polls their jobs and projects
//! each status transition onto a shared [`library::Library`].

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod library;
pub mod model;
pub mod projector;
pub mod timer;
pub mod tracker;
pub mod wizard;
