//! # OCMP EC Library
//!
//! Demo drivers and transport adapters for the embedded controller
//! binary. Split out as a library so integration tests can boot the same
//! schema the binary ships.

pub mod sim;
pub mod tcp;
