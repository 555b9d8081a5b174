//! Infrastructure layer
//!
//! Handles all I/O operations: network, filesystem, and external processes.

pub mod container;
pub mod download;
pub mod filesystem;
