//! Core domain types and decision logic.

pub mod bar;
pub mod bar_series;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod intent;
pub mod pattern;
pub mod position;
pub mod position_manager;
pub mod risk;
pub mod session;
pub mod signal;
