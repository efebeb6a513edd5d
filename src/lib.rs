//! # Postbranch
//!
//! Control plane for branchable Postgres repositories. A repository owns a
//! storage pool (a raw block device or a virtual disk image) and a tree of
//! named branches, each one an independently running Postgres instance backed
//! by a copy-on-write clone of the repository's data.
//!
//! The crate is organised as:
//!
//! - [`api`] - REST surface (axum handlers, DTOs, OpenAPI docs)
//! - [`services`] - lifecycle orchestration, import jobs, process supervision
//! - [`platform`] - capability traits for storage, processes and source probing
//! - [`storage`] - SQLite persistence for repos, pools, branches and sources
//! - [`domain`] - identifiers, status enums, source configs, size units
//! - [`config`], [`errors`], [`observability`] - shared infrastructure

pub mod api;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod platform;
pub mod services;
pub mod storage;
pub mod validation;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
