//! # sap-core
//!
//! Core types and error handling for the `sap` audio player.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
