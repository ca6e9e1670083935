// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The `api` module contains the capability traits and types a scan session needs from the host
//! Bluetooth stack. Implementations live in [`crate::host`] and [`crate::simulated`].

pub mod bleuuid;

use async_trait::async_trait;
use futures::stream::Stream;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::pin::Pin;
use uuid::Uuid;

use crate::Result;

/// Opaque identifier the host stack assigns to a peripheral.
///
/// On Apple hosts this is the per-host peripheral UUID, on BlueZ it is derived from the device
/// address. Use [`PeripheralId::as_uuid`] when a UUID comparison is needed.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        PeripheralId(id.into())
    }

    /// Returns the identifier as a UUID if the host uses UUID identifiers.
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeripheralId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for PeripheralId {
    fn from(uuid: Uuid) -> Self {
        PeripheralId(uuid.hyphenated().to_string())
    }
}

/// Power and authorization state of the host's Bluetooth radio.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CentralState {
    /// The host has not reported a state yet.
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    /// The process is not allowed to use Bluetooth.
    Unauthorized,
}

impl CentralState {
    /// True if a scan may be started in this state.
    pub fn is_usable(self) -> bool {
        self == CentralState::PoweredOn
    }
}

impl Display for CentralState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            CentralState::Unknown => "unknown",
            CentralState::PoweredOn => "powered on",
            CentralState::PoweredOff => "powered off",
            CentralState::Unauthorized => "unauthorized",
        };
        f.write_str(name)
    }
}

/// The advertisement data received with a discovery notification.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// The local name of the peripheral, if it advertises one.
    pub local_name: Option<String>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
    /// Manufacturer data keyed by company identifier.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Service data keyed by service UUID.
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub tx_power_level: Option<i16>,
}

impl Advertisement {
    /// Builds an advertisement carrying only a service list, which is all most filters look at.
    pub fn with_services(services: impl IntoIterator<Item = Uuid>) -> Self {
        Advertisement {
            services: services.into_iter().collect(),
            ..Default::default()
        }
    }
}

/// Notifications delivered by a [`Central`]. These may arrive on a thread the caller does not
/// control; they are only ordered per radio event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    DeviceDiscovered {
        id: PeripheralId,
        advertisement: Advertisement,
        /// Signal strength in dBm, when the host reports one.
        rssi: Option<i16>,
    },
    DeviceConnected(PeripheralId),
    DeviceConnectionFailed {
        id: PeripheralId,
        reason: String,
    },
    DeviceDisconnected(PeripheralId),
    /// The radio's power or authorization state changed.
    StateUpdate(CentralState),
}

/// The filter handed to the host when a scan begins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Only report peripherals advertising at least one of these services. An empty list means no
    /// service filtering at the host level.
    pub services: Vec<Uuid>,
}

pub type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Central is the "client" of BLE: the host facility that scans for and connects to
/// peripherals. A scan session holds a clone of one and never creates it.
#[async_trait]
pub trait Central: Send + Sync + Clone + Debug + 'static {
    /// Retrieve a stream of [`CentralEvent`]s. Fails with
    /// [`Error::InvalidHandle`](crate::Error::InvalidHandle) if the handle can no longer deliver
    /// notifications.
    async fn events(&self) -> Result<EventStream>;

    /// Starts discovery. Only one scan per central is well defined; callers must stop before
    /// beginning again.
    async fn begin_scan(&self, filter: ScanFilter) -> Result<()>;

    /// Stops discovery. Stopping a central that is not scanning is a no-op.
    async fn stop_scan(&self) -> Result<()>;

    /// Queries the current power and authorization state of the radio.
    async fn adapter_state(&self) -> Result<CentralState>;

    /// Requests a connection to a discovered peripheral. The outcome arrives as
    /// [`CentralEvent::DeviceConnected`] or [`CentralEvent::DeviceConnectionFailed`].
    async fn connect(&self, id: &PeripheralId) -> Result<()>;
}
