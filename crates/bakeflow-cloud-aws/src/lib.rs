//! AWS EC2 implementation of the Bakeflow compute provider

pub mod provider;

pub use provider::AwsProvider;
