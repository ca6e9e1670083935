// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! An in-memory [`Central`] for driving scan sessions without radio hardware.
//!
//! The caller plays the part of the host stack: it sets the radio state, injects advertisements
//! and decides which peripherals refuse connections.

use crate::api::{
    Advertisement, Central, CentralEvent, CentralState, EventStream, PeripheralId, ScanFilter,
};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashSet;
use futures::stream::StreamExt;
use log::trace;
use static_assertions::assert_impl_all;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug)]
struct Inner {
    state: Mutex<CentralState>,
    scan: Mutex<Option<ScanFilter>>,
    released: AtomicBool,
    unreachable: DashSet<PeripheralId>,
    begin_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    connect_calls: AtomicUsize,
    events_channel: broadcast::Sender<CentralEvent>,
}

/// A central whose behavior is scripted by the caller. Clones share the same simulated radio.
#[derive(Clone, Debug)]
pub struct SimulatedCentral {
    inner: Arc<Inner>,
}

assert_impl_all!(SimulatedCentral: Central, Clone, Debug, Send, Sync);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedCentral {
    pub fn new(state: CentralState) -> Self {
        let (events_channel, _) = broadcast::channel(256);
        SimulatedCentral {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                scan: Mutex::new(None),
                released: AtomicBool::new(false),
                unreachable: DashSet::new(),
                begin_calls: AtomicUsize::new(0),
                stop_calls: AtomicUsize::new(0),
                connect_calls: AtomicUsize::new(0),
                events_channel,
            }),
        }
    }

    fn emit(&self, event: CentralEvent) {
        if let Err(lost) = self.inner.events_channel.send(event) {
            trace!("Lost simulated event, while nothing subscribed: {:?}", lost);
        }
    }

    fn check_usable(&self) -> Result<()> {
        if self.inner.released.load(Ordering::SeqCst) {
            Err(Error::InvalidHandle)
        } else {
            Ok(())
        }
    }

    /// Changes the radio state and notifies subscribers.
    pub fn set_state(&self, state: CentralState) {
        *lock(&self.inner.state) = state;
        self.emit(CentralEvent::StateUpdate(state));
    }

    /// Delivers an advertisement. Like a real radio, nothing is delivered unless a scan is
    /// running and the advertisement lists one of the scan filter's services (if it has any);
    /// returns whether it was delivered.
    pub fn advertise(&self, id: PeripheralId, advertisement: Advertisement, rssi: Option<i16>) -> bool {
        let passes = match &*lock(&self.inner.scan) {
            None => false,
            Some(filter) => {
                filter.services.is_empty()
                    || advertisement
                        .services
                        .iter()
                        .any(|service| filter.services.contains(service))
            }
        };
        if !passes {
            return false;
        }
        self.emit(CentralEvent::DeviceDiscovered {
            id,
            advertisement,
            rssi,
        });
        true
    }

    /// Makes connection attempts to `id` fail.
    pub fn set_unreachable(&self, id: PeripheralId) {
        self.inner.unreachable.insert(id);
    }

    /// Invalidates the handle: every later call fails with [`Error::InvalidHandle`].
    pub fn release(&self) {
        self.inner.released.store(true, Ordering::SeqCst);
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.inner.scan).is_some()
    }

    /// The filter of the running scan, if any.
    pub fn scan_filter(&self) -> Option<ScanFilter> {
        lock(&self.inner.scan).clone()
    }

    pub fn begin_calls(&self) -> usize {
        self.inner.begin_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.inner.stop_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Central for SimulatedCentral {
    async fn events(&self) -> Result<EventStream> {
        self.check_usable()?;
        let receiver = self.inner.events_channel.subscribe();
        Ok(Box::pin(
            BroadcastStream::new(receiver).filter_map(|x| async move { x.ok() }),
        ))
    }

    async fn begin_scan(&self, filter: ScanFilter) -> Result<()> {
        self.check_usable()?;
        let mut scan = lock(&self.inner.scan);
        if scan.is_some() {
            return Err(Error::ScanInProgress);
        }
        *scan = Some(filter);
        self.inner.begin_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.check_usable()?;
        lock(&self.inner.scan).take();
        self.inner.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn adapter_state(&self) -> Result<CentralState> {
        self.check_usable()?;
        Ok(*lock(&self.inner.state))
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        self.check_usable()?;
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.unreachable.contains(id) {
            self.emit(CentralEvent::DeviceConnectionFailed {
                id: id.clone(),
                reason: "peripheral did not respond".to_owned(),
            });
        } else {
            self.emit(CentralEvent::DeviceConnected(id.clone()));
        }
        Ok(())
    }
}
