//! openwrt-composer - Build OpenWRT firmware images from a YAML manifest
//!
//! This library reads a tool configuration and a firmware manifest, stages
//! the configuration files for every firmware entry, and runs the OpenWRT
//! Image Builder inside a container for each of them.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Manifest model, file materialization and build orchestration
//! - [`infra`] - Infrastructure layer (containers, downloads, filesystem)
//! - [`config`] - Configuration defaults and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
