//! Core utilities and shared types
//!
//! This module contains cross-cutting concerns of the engine:
//!
//! - `cancel`: Cooperative cancellation token consulted between records
//! - `error`: The engine error taxonomy
//! - `lockfile`: Advisory lock files with atomic rename publication

pub mod cancel;
pub mod error;
pub mod lockfile;
