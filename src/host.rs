// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! [`Central`] on top of the host's Bluetooth stack, reached through `btleplug`
//! (CoreBluetooth on macOS/iOS, BlueZ on Linux, WinRT on Windows).

use crate::api::{
    Advertisement, Central, CentralEvent, CentralState, EventStream, PeripheralId, ScanFilter,
};
use crate::{Error, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central as _, CentralEvent as HostEvent, CentralState as HostState, Manager as _,
    Peripheral as _, ScanFilter as HostFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use log::{debug, trace};
use static_assertions::assert_impl_all;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => Error::RadioUnavailable(CentralState::Unauthorized),
            btleplug::Error::Other(inner) => Error::Other(inner),
            other => Error::Other(Box::new(other)),
        }
    }
}

fn state_from_host(state: HostState) -> CentralState {
    match state {
        HostState::PoweredOn => CentralState::PoweredOn,
        HostState::PoweredOff => CentralState::PoweredOff,
        _ => CentralState::Unknown,
    }
}

/// A host Bluetooth adapter acting as the scan session's central.
#[derive(Clone, Debug)]
pub struct HostCentral {
    // Held so the platform manager lives as long as any clone of the adapter.
    _manager: Option<Manager>,
    adapter: Adapter,
    peripherals: Arc<DashMap<PeripheralId, Peripheral>>,
    failures: broadcast::Sender<CentralEvent>,
}

assert_impl_all!(HostCentral: Central, Clone, Debug, Send, Sync);

impl HostCentral {
    pub fn new(adapter: Adapter) -> Self {
        Self::with_manager(None, adapter)
    }

    fn with_manager(manager: Option<Manager>, adapter: Adapter) -> Self {
        let (failures, _) = broadcast::channel(16);
        HostCentral {
            _manager: manager,
            adapter,
            peripherals: Arc::new(DashMap::new()),
            failures,
        }
    }

    /// Opens the first Bluetooth adapter the host reports. Fails with [`Error::InvalidHandle`]
    /// when the host has none.
    pub async fn first_adapter() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::InvalidHandle)?;
        match adapter.adapter_info().await {
            Ok(info) => debug!("Using adapter {}", info),
            Err(err) => debug!("Using adapter (no info: {})", err),
        }
        Ok(Self::with_manager(Some(manager), adapter))
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn translate(&self, event: HostEvent) -> Option<CentralEvent> {
        match event {
            HostEvent::DeviceDiscovered(id) | HostEvent::DeviceUpdated(id) => {
                let peripheral = match self.adapter.peripheral(&id).await {
                    Ok(peripheral) => peripheral,
                    Err(err) => {
                        trace!("Peripheral {} vanished before lookup: {}", id, err);
                        return None;
                    }
                };
                let properties = match peripheral.properties().await {
                    Ok(Some(properties)) => properties,
                    Ok(None) => return None,
                    Err(err) => {
                        trace!("No properties for {}: {}", id, err);
                        return None;
                    }
                };
                let key = PeripheralId::new(id.to_string());
                self.peripherals.insert(key.clone(), peripheral);
                Some(CentralEvent::DeviceDiscovered {
                    id: key,
                    advertisement: Advertisement {
                        local_name: properties.local_name,
                        services: properties.services,
                        manufacturer_data: properties.manufacturer_data,
                        service_data: properties.service_data,
                        tx_power_level: properties.tx_power_level,
                    },
                    rssi: properties.rssi,
                })
            }
            HostEvent::DeviceConnected(id) => Some(CentralEvent::DeviceConnected(
                PeripheralId::new(id.to_string()),
            )),
            HostEvent::DeviceDisconnected(id) => Some(CentralEvent::DeviceDisconnected(
                PeripheralId::new(id.to_string()),
            )),
            HostEvent::StateUpdate(state) => Some(CentralEvent::StateUpdate(state_from_host(state))),
            other => {
                trace!("Ignoring host event {:?}", other);
                None
            }
        }
    }
}

#[async_trait]
impl Central for HostCentral {
    async fn events(&self) -> Result<EventStream> {
        let host_events = self.adapter.events().await?;
        let central = self.clone();
        let discovered = host_events.filter_map(move |event| {
            let central = central.clone();
            async move { central.translate(event).await }
        });
        let failures = BroadcastStream::new(self.failures.subscribe())
            .filter_map(|x| async move { x.ok() });
        Ok(Box::pin(stream::select(discovered, failures)))
    }

    async fn begin_scan(&self, filter: ScanFilter) -> Result<()> {
        let mut host_filter = HostFilter::default();
        host_filter.services = filter.services;
        self.adapter.start_scan(host_filter).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn adapter_state(&self) -> Result<CentralState> {
        Ok(state_from_host(self.adapter.adapter_state().await?))
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = self
            .peripherals
            .get(id)
            .map(|val| val.value().clone())
            .ok_or_else(|| Error::DeviceNotFound(id.clone()))?;
        let failures = self.failures.clone();
        let id = id.clone();
        // Success is reported by the host as a DeviceConnected event.
        tokio::spawn(async move {
            if let Err(err) = peripheral.connect().await {
                let _ = failures.send(CentralEvent::DeviceConnectionFailed {
                    id,
                    reason: err.to_string(),
                });
            }
        });
        Ok(())
    }
}
