//! Bakeflow: bake AWS machine images from Ansible roles
//!
//! The `bake` binary lives in `main.rs`; this library carries the pieces the
//! CLI dispatches to — the provisioning engine, the Ansible process wrappers,
//! the inventory writer and the image capture / teardown flows — so they can
//! be exercised against a mock provider in integration tests.

pub mod ansible;
pub mod inventory;
pub mod lifecycle;
pub mod provision;

/// Which resolved stage of an instance a command operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Test,
}
