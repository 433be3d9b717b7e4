//! Carya
//!
//! Watches a directory tree and groups file edits into time-bounded chunks,
//! each holding a unified diff of what changed while the file was being worked on.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod observability;
pub mod storage;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
