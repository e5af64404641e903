//! # Telemetry Module
//!
//! Delivers measurements to the outside world.
//!
//! This module handles:
//! - Splitting a live measurement into five named unit updates
//! - Applying updates only when a value changed
//! - Writing applied updates to rotating JSONL files

pub mod sink;
pub mod logger;
