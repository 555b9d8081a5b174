//! Configuration constants
//!
//! - [`defaults`] - Default values for tool settings and container layout
//! - [`urls`] - Upstream download locations

pub mod defaults;
pub mod urls;
