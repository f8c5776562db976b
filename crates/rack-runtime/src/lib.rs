//! # rack-runtime
//!
//! Runs an app's service containers on the local engine.
//!
//! Handles:
//! - **Args**: the materialized `run` invocation of each service.
//! - **Driver**: one container from spawn to exit, output streamed.
//! - **Output**: line-atomic multiplexing with per-service prefixes.
//! - **Supervisor**: ordered launches, result aggregation, and reverse
//!   teardown on interrupt.
//! - **Probe**: host ports already in use on the engine host.
//! - **Lifecycle**: preflight, images, and supervision of a `start` run.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod args;
pub mod driver;
pub mod lifecycle;
pub mod output;
pub mod probe;
pub mod supervisor;

pub use lifecycle::{StartOptions, app_name, start};
pub use output::{OutputMux, Prefix};
pub use supervisor::{Supervisor, SupervisorOptions};
