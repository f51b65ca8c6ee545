//! Port traits for the collaborators the engine depends on.

pub mod config_port;
pub mod data_port;
pub mod execution_port;
