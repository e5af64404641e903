//! # Ecometer Bridge Library
//!
//! Read live tank level data from an Ecometer S display over its serial link.
//!
//! This library provides the frame reader, datagram decoder and measurement
//! translation for the display's binary protocol, plus a polling supervisor
//! that runs them continuously and publishes the results.

pub mod config;
pub mod error;
pub mod ecometer;
pub mod serial;
pub mod supervisor;
pub mod telemetry;
