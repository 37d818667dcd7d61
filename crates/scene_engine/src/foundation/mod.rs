//! Foundation module - Core utilities and types
//!
//! - Math types and TRS composition
//! - Frame timing
//! - Logging bootstrap

pub mod math;
pub mod time;
pub mod logging;
