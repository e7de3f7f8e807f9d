//! Tidy Worker - background hygiene for the Tidy object store.
//!
//! Loads the store from a JSON snapshot, runs duplicate reconciliation and
//! orphan repair once at start-up, then expires cached like users on an
//! interval. Every engine pass runs on tokio's blocking pool.

pub mod config;
pub mod error;
pub mod job;
pub mod persist;
pub mod service;

pub use config::{Config, ConfigError};
pub use error::{Result, WorkerError};
pub use job::{HygieneJob, StartupReport};
pub use persist::{load_store, save_store};
pub use service::{HygienePasses, ReconcileService};
