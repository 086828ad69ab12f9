//! # OCMP Common Library
//!
//! Shared types for the OCMP embedded-controller message bus:
//!
//! - [`proto`] - Wire protocol enumerations, frame model and codec
//! - [`schema`] - Component tree, driver trait and parameter descriptors
//! - [`state`] - Subsystem lifecycle states
//! - [`postdata`] - Power-on self-test codes and result records
//! - [`config`] - EC configuration loading
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ocmp_common::prelude::*;
//! ```

pub mod config;
pub mod postdata;
pub mod prelude;
pub mod proto;
pub mod schema;
pub mod state;
