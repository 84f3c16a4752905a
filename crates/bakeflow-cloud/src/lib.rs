//! Compute provider abstraction for Bakeflow
//!
//! The lifecycle engine talks to the cloud exclusively through the
//! [`ComputeProvider`] trait so the AWS implementation stays a thin,
//! swappable shell. This crate also owns the per-instance state store
//! (`.bakeflow/` files) and the readiness pollers that gate every
//! asynchronous boundary of a build.

pub mod error;
pub mod provider;
pub mod resolve;
pub mod state;
pub mod wait;

pub use error::{CloudError, Result};
pub use provider::{
    BlockDeviceRequest, ComputeProvider, EbsRequest, InstanceDescription, LaunchRequest,
};
pub use state::{BuildResources, InstanceFiles, PersistedState, WORK_DIR};
pub use wait::{LoginCheck, Spinner};
