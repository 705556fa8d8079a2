//! contented library crate.
//!
//! Media catalog with an asynchronous preview task pipeline. The binary in
//! `main.rs` is a thin CLI over [`services::ServiceContainer`].

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod preview;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};
