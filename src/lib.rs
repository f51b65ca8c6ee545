//! futurebreakout: bar-driven trading decision engine.
//!
//! Hexagonal architecture: decision logic in [`domain`], collaborator traits
//! in [`ports`], concrete collaborators in [`adapters`], and the operator
//! surface in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
