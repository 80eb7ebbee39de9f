pub mod commands;
pub mod jobs;
pub mod provisioning;
pub mod shadows;
pub mod topics;

pub use commands::*;
pub use jobs::*;
pub use provisioning::*;
pub use shadows::*;
