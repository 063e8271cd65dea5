//! Tutor/student lesson dashboard backend: lesson catalogue, watch-progress
//! reconciliation and completion statistics over a pluggable row store.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod postgrest;
pub mod progress;
pub mod routes;
pub mod stats;
pub mod store;
pub mod video;
pub mod watch;
