//! Control plane artifact synchronizer for the APK agent
//!
//! Fetches the runtime artifact bundle for the configured gateway
//! environments, turns every deployed API into data plane resources and
//! applies them to the cluster. [`pipeline::Synchronizer`] ties the stages
//! together:
//!
//! - [`fetch`]: worker pool and retrying client for the control plane
//! - [`archive`] and [`artifact`]: the outer bundle and per-API projects
//! - [`apkconf`]: APK-Conf generation
//! - [`resources`]: resource generation and placement tagging
//! - [`cluster`]: server-side apply and AI rate limit cleanup

#![deny(missing_docs)]

pub mod apkconf;
pub mod archive;
pub mod artifact;
pub mod cluster;
pub mod config;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod ratelimit;
pub mod resources;

#[cfg(test)]
mod testutil;

pub use config::AgentConfig;
pub use pipeline::{CycleReport, SkipReason, SkippedDeployment, Synchronizer};
