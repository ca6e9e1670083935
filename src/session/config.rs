// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Scan configuration and the command line that overrides it.

use crate::api::bleuuid::{parse_ble_uuid, ParseBleUuidError};
use crate::{Error, Result};
use clap::error::ErrorKind;
use clap::Parser;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;
use std::ffi::OsString;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Service advertised by Hello peripherals.
pub const HELLO_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001e3f_1212_efde_1523_785feabcd123);

/// Identifier of the Hello development peripheral.
pub const HELLO_DEVICE_UUID: Uuid = Uuid::from_u128(0x2fe3a7e4_8355_40a6_89d5_4e7b3f29c73e);

pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything a [`ScanSession`](super::ScanSession) needs to know about the scan it runs.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// How long a scan runs before it is stopped automatically.
    pub duration: Duration,
    /// Report peripherals advertising any of these services.
    pub services: Vec<Uuid>,
    /// Report the peripheral with this identifier regardless of what it advertises.
    pub device: Option<Uuid>,
    /// Only report peripherals advertising exactly this local name.
    pub name: Option<String>,
    /// Stop the scan after the first reported peripheral.
    pub stop_on_match: bool,
    /// Connect to the first reported peripheral and stop once the connection settles.
    pub connect: bool,
    /// How long to wait for the radio to report a state before giving up.
    pub state_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            duration: DEFAULT_SCAN_DURATION,
            services: vec![HELLO_SERVICE_UUID],
            device: Some(HELLO_DEVICE_UUID),
            name: None,
            stop_on_match: false,
            connect: false,
            state_timeout: DEFAULT_STATE_TIMEOUT,
        }
    }
}

impl ScanConfig {
    /// Returns a copy of this configuration with the given command line tokens applied on top.
    /// The tokens must not include the program name. `self` is never modified, so a failed parse
    /// leaves the caller's configuration as it was.
    pub fn with_arguments<I, T>(&self, args: I) -> Result<ScanConfig>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = ScanArgs::from_tokens(args)?;
        Ok(args.apply(self))
    }
}

/// Command line surface of the scanner.
#[derive(Parser, Debug, Default)]
#[command(
    name = "cliscan",
    version,
    about = "Scan for Bluetooth LE peripherals advertising a target service"
)]
pub struct ScanArgs {
    /// Scan duration in seconds (fractions allowed)
    #[arg(
        short,
        long,
        value_name = "SECS",
        value_parser = parse_seconds,
        allow_negative_numbers = true
    )]
    pub duration: Option<Duration>,

    /// Target service UUID, full or 16/32-bit short form. Repeat for several services
    #[arg(short, long = "service", value_name = "UUID", value_parser = parse_uuid)]
    pub services: Vec<Uuid>,

    /// Target peripheral identifier
    #[arg(long, value_name = "UUID", value_parser = parse_uuid)]
    pub device: Option<Uuid>,

    /// Report every peripheral, ignoring the service and device targets
    #[arg(short, long, conflicts_with_all = ["services", "device"])]
    pub all: bool,

    /// Only report peripherals advertising this local name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Stop after the first matching peripheral
    #[arg(long)]
    pub first: bool,

    /// Connect to the first matching peripheral, then stop
    #[arg(long)]
    pub connect: bool,

    /// Seconds to wait for the radio to report its state
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub state_timeout: Option<Duration>,
}

impl ScanArgs {
    /// Parses argument tokens (without the program name).
    pub fn from_tokens<I, T>(args: I) -> Result<ScanArgs>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let argv = std::iter::once(OsString::from("cliscan")).chain(args.into_iter().map(Into::into));
        ScanArgs::try_parse_from(argv).map_err(|err| match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Error::Usage(err.to_string()),
            _ => Error::InvalidArgument(err.to_string().trim_end().to_owned()),
        })
    }

    /// Overrides the fields given on the command line, keeping the rest of `base`.
    pub fn apply(&self, base: &ScanConfig) -> ScanConfig {
        let mut config = base.clone();
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if self.all {
            config.services.clear();
            config.device = None;
        }
        if !self.services.is_empty() {
            config.services = self.services.clone();
        }
        if self.device.is_some() {
            config.device = self.device;
        }
        if self.name.is_some() {
            config.name = self.name.clone();
        }
        config.stop_on_match |= self.first;
        config.connect |= self.connect;
        if let Some(timeout) = self.state_timeout {
            config.state_timeout = timeout;
        }
        config
    }
}

fn parse_seconds(input: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", input))?;
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("'{}' must be a finite, non-negative number of seconds", input))?;
    if Instant::now().checked_add(duration).is_none() {
        return Err(format!("'{}' seconds is too far in the future to schedule", input));
    }
    Ok(duration)
}

fn parse_uuid(input: &str) -> std::result::Result<Uuid, ParseBleUuidError> {
    parse_ble_uuid(input)
}
