//! Core business logic module
//!
//! Manifest and tool configuration models, file staging and build
//! orchestration. Process, network and filesystem access goes through
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`tool_config`] - Tool configuration file and environment overrides
//! - [`manifest`] - Firmware manifest parsing and validation
//! - [`validate`] - Field-path validation helpers for YAML documents
//! - [`layout`] - Work directory layout
//! - [`generator`] - Router configuration rendering
//! - [`materialize`] - Staging of per-firmware files
//! - [`image_builder`] - Container images and Image Builder runs
//! - [`compose`] - The per-entry build pipeline

pub mod compose;
pub mod generator;
pub mod image_builder;
pub mod layout;
pub mod manifest;
pub mod materialize;
pub mod tool_config;
pub mod validate;
