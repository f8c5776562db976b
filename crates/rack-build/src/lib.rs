//! # rack-build
//!
//! Produces the images a run needs and publishes them.
//!
//! Handles:
//! - **Plan**: groups build services by resolved context so a shared tree
//!   builds once, collects pulls, and retags every service to `app/service`.
//! - **Tag**: ephemeral per-context build tags.
//! - **Retry**: backoff policy for registry pulls and pushes.
//! - **Push**: registry login and publishing of service images.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod plan;
pub mod push;
pub mod retry;
pub mod tag;

pub use plan::{BuildGroup, BuildPlan, ExecuteOptions};
pub use retry::RetryPolicy;
