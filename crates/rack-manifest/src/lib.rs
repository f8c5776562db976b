//! # rack-manifest
//!
//! Reads and normalizes the Compose-style manifest that describes an app's
//! services, and derives everything the lifecycle engine needs from it
//! before any container exists.
//!
//! Handles:
//! - **Loader**: YAML decoding, `.env` merging, path expansion, and
//!   normalization of polymorphic fields into [`model`] types.
//! - **Validator**: service names, `build` XOR `image`, link targets.
//! - **Env**: effective environment of each service and missing variables.
//! - **Links**: connection variables injected for linked services.
//! - **Graph**: deterministic start and teardown order from `links`.
//! - **Ports**: port declaration parsing, shifting, and conflict detection.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod dotenv;
pub mod env;
pub mod graph;
pub mod links;
pub mod loader;
pub mod model;
pub mod ports;
mod raw;
pub mod validator;

pub use loader::{load, load_file, parse_str};
pub use model::{EnvEntry, ImageSource, Link, Manifest, Service, ServiceCommand};
