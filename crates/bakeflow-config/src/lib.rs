//! Layered build configuration for Bakeflow
//!
//! A Bakeflow document describes the machine images a role can be baked into
//! as a cross product of *platforms* (source AMI plus build/test overrides)
//! and *profiles* (named variable sets). This crate loads the document,
//! expands it through Tera with the process environment as template context,
//! validates it, and resolves every (platform, profile) pair into a fully
//! defaulted [`BuildSpec`].

pub mod error;
pub mod model;
pub mod raw;
pub mod resolver;
pub mod template;

pub use error::{ConfigError, Result};
pub use model::{
    BlockDeviceMapping, BuildSpec, Connection, EbsSpec, ExtraVars, InstanceSpec, UserData,
    VolumeType,
};
pub use resolver::{Config, find_document, load, resolve_document};
