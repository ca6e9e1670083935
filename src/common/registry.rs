// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use crate::api::PeripheralId;
use crate::session::{Discovery, ScanEvent};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{Stream, StreamExt};
use log::trace;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const EVENT_CAPACITY: usize = 256;

/// Keeps one entry per reported peripheral and fans session events out to subscribers.
#[derive(Debug)]
pub struct DiscoveryRegistry {
    discoveries: DashMap<PeripheralId, Discovery>,
    events_channel: broadcast::Sender<ScanEvent>,
}

impl Default for DiscoveryRegistry {
    fn default() -> Self {
        let (broadcast_sender, _) = broadcast::channel(EVENT_CAPACITY);
        DiscoveryRegistry {
            discoveries: DashMap::new(),
            events_channel: broadcast_sender,
        }
    }
}

impl DiscoveryRegistry {
    pub fn emit(&self, event: ScanEvent) {
        if let Err(lost) = self.events_channel.send(event) {
            trace!("Lost scan event, while nothing subscribed: {:?}", lost);
        }
    }

    pub fn event_stream(&self) -> Pin<Box<dyn Stream<Item = ScanEvent> + Send>> {
        let receiver = self.events_channel.subscribe();
        Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move {
            match x {
                Ok(event) => Some(event),
                Err(lagged) => {
                    trace!("Scan event subscriber fell behind: {}", lagged);
                    None
                }
            }
        }))
    }

    /// Records a matching discovery. Returns true the first time a peripheral is seen; later
    /// sightings only refresh the stored advertisement and signal strength.
    pub fn record(&self, discovery: Discovery) -> bool {
        match self.discoveries.entry(discovery.id.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.rssi = discovery.rssi.or(existing.rssi);
                existing.advertisement = discovery.advertisement;
                existing.matched |= discovery.matched;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(discovery);
                true
            }
        }
    }

    pub fn discoveries(&self) -> Vec<Discovery> {
        let mut all: Vec<Discovery> = self
            .discoveries
            .iter()
            .map(|val| val.value().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn discovery(&self, id: &PeripheralId) -> Option<Discovery> {
        self.discoveries.get(id).map(|val| val.value().clone())
    }

    pub fn len(&self) -> usize {
        self.discoveries.len()
    }

    pub fn clear(&self) {
        self.discoveries.clear();
    }
}
