//! Device agent library: configuration, the operation executor, credential
//! adoption and the broker session driving a `ThingClient`.
//!
//! Exposed as a library so integration tests can drive sessions against a
//! mock channel.

pub mod actions;
pub mod config;
pub mod credentials;
pub mod executor;
pub mod session;
