// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! cliscan looks for Bluetooth LE peripherals advertising a target service, for a bounded amount
//! of time, and reports what it finds.
//!
//! The radio itself is never touched directly. Everything goes through the [`api::Central`]
//! capability trait, which is implemented for real hardware in [`host`] (on top of `btleplug`) and
//! in memory in [`simulated`]. A [`session::ScanSession`] drives one bounded scan over a central:
//!
//! ```rust,no_run
//! use cliscan::session::{ScanEvent, ScanSession};
//! use cliscan::simulated::SimulatedCentral;
//! use cliscan::api::CentralState;
//! use futures::stream::StreamExt;
//! use std::time::Duration;
//!
//! # async fn run() -> cliscan::Result<()> {
//! let central = SimulatedCentral::new(CentralState::PoweredOn);
//! let mut session = ScanSession::new(central).await?;
//! session.parse_arguments(["--duration", "5"])?;
//!
//! let mut events = session.events();
//! session.start_scan(Duration::from_secs(5)).await?;
//! while let Some(event) = events.next().await {
//!     match event {
//!         ScanEvent::Discovered(discovery) => println!("{:?}", discovery),
//!         ScanEvent::Stopped(reason) => {
//!             println!("stopped: {}", reason);
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
mod common;
#[cfg(feature = "host")]
pub mod host;
pub mod session;
pub mod simulated;

use api::{CentralState, PeripheralId};

/// The main error type returned by most methods in cliscan.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Central handle is invalid or no longer usable")]
    InvalidHandle,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Help or version output was requested instead of a scan configuration.
    #[error("{0}")]
    Usage(String),

    #[error("Bluetooth radio unavailable (state: {0})")]
    RadioUnavailable(CentralState),

    #[error("No scan is running")]
    NotScanning,

    #[error("A scan is already running on this session")]
    ScanInProgress,

    #[error("Session has stopped; reset it before scanning again")]
    SessionStopped,

    #[error("Device not found: {0}")]
    DeviceNotFound(PeripheralId),

    #[error("{}", .0)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience type for a result using the cliscan [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
