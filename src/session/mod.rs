// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! A [`ScanSession`] runs one bounded discovery scan over a [`Central`] and reports the
//! peripherals that match its [`ScanConfig`].
//!
//! ```text
//!   Idle --start_scan--> Scanning --(elapsed | matched | connected | cancelled | radio lost)--> Stopped
//!    ^                                                                                          |
//!    +------------------------------------------reset-------------------------------------------+
//! ```

pub mod config;
mod filter;

pub use config::{ScanArgs, ScanConfig, HELLO_DEVICE_UUID, HELLO_SERVICE_UUID};
pub use filter::{Discovery, DiscoveryFilter, MatchKind};

use crate::api::{Central, CentralEvent, CentralState, EventStream, PeripheralId, ScanFilter};
use crate::common::registry::DiscoveryRegistry;
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use log::{debug, info, trace, warn};
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::{self, Instant};

/// Lifecycle of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    /// Terminal until [`ScanSession::reset`] is called.
    Stopped(StopReason),
}

/// Why a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The scan duration ran out.
    Elapsed,
    /// A peripheral matched and the session was asked to stop on the first match.
    Matched,
    /// The connection requested to the first match completed.
    Connected(PeripheralId),
    ConnectionFailed { id: PeripheralId, reason: String },
    /// [`ScanSession::stop_scan`] was called or the session was dropped.
    Cancelled,
    /// The radio was switched off or access was revoked mid-scan.
    RadioUnavailable(CentralState),
    /// The central stopped delivering notifications.
    HostClosed,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            StopReason::Elapsed => f.write_str("duration elapsed"),
            StopReason::Matched => f.write_str("matching peripheral found"),
            StopReason::Connected(id) => write!(f, "connected to {}", id),
            StopReason::ConnectionFailed { id, reason } => {
                write!(f, "connection to {} failed: {}", id, reason)
            }
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::RadioUnavailable(state) => write!(f, "radio {}", state),
            StopReason::HostClosed => f.write_str("host closed the event stream"),
        }
    }
}

/// Notifications a session publishes to its subscribers, see [`ScanSession::events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Started,
    /// A matching peripheral was seen for the first time in this scan.
    Discovered(Discovery),
    Connected(PeripheralId),
    ConnectionFailed {
        id: PeripheralId,
        reason: String,
    },
    StateChanged(CentralState),
    Stopped(StopReason),
}

#[derive(Debug)]
struct Shared {
    state: watch::Sender<ScanState>,
    registry: DiscoveryRegistry,
}

impl Shared {
    fn finish(&self, reason: StopReason) {
        info!(
            "Scan stopped: {} ({} peripheral(s) reported)",
            reason,
            self.registry.len()
        );
        self.state.send_replace(ScanState::Stopped(reason.clone()));
        self.registry.emit(ScanEvent::Stopped(reason));
    }
}

/// Coordinates a single bounded BLE discovery scan on a borrowed central handle.
#[derive(Debug)]
pub struct ScanSession<C: Central> {
    central: C,
    config: ScanConfig,
    shared: Arc<Shared>,
    // Serializes start_scan and reset so overlapping starts cannot race past the Idle check.
    start_lock: Mutex<()>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl<C: Central> ScanSession<C> {
    /// Creates a session with the default configuration.
    ///
    /// Fails with [`Error::InvalidHandle`] if the central cannot deliver notifications.
    pub async fn new(central: C) -> Result<Self> {
        Self::with_config(central, ScanConfig::default()).await
    }

    pub async fn with_config(central: C, config: ScanConfig) -> Result<Self> {
        if let Err(err) = central.events().await {
            debug!("Rejecting central {:?}: {}", central, err);
            return Err(Error::InvalidHandle);
        }
        let (state, _) = watch::channel(ScanState::Idle);
        Ok(ScanSession {
            central,
            config,
            shared: Arc::new(Shared {
                state,
                registry: DiscoveryRegistry::default(),
            }),
            start_lock: Mutex::new(()),
            cancel: Mutex::new(None),
        })
    }

    /// The central this session scans with.
    pub fn central(&self) -> &C {
        &self.central
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Applies command line tokens (without the program name) to the configuration. On failure
    /// the configuration is left unchanged.
    pub fn parse_arguments<I, T>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        if self.state() == ScanState::Scanning {
            return Err(Error::ScanInProgress);
        }
        self.config = self.config.with_arguments(args)?;
        debug!("Scan configuration: {:?}", self.config);
        Ok(())
    }

    pub fn state(&self) -> ScanState {
        self.shared.state.borrow().clone()
    }

    /// Subscribes to session events. Subscribe before starting a scan to see all of them.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = ScanEvent> + Send>> {
        self.shared.registry.event_stream()
    }

    /// Peripherals reported so far in the current scan.
    pub fn discoveries(&self) -> Vec<Discovery> {
        self.shared.registry.discoveries()
    }

    /// The stored discovery for `id`, if it was reported in the current scan.
    pub fn discovery(&self, id: &PeripheralId) -> Option<Discovery> {
        self.shared.registry.discovery(id)
    }

    /// Starts a scan that stops by itself once `duration` has elapsed. A zero duration stops
    /// right after starting.
    ///
    /// Returns once the host has accepted the scan; discoveries are published through
    /// [`ScanSession::events`]. Fails with [`Error::RadioUnavailable`] if the radio is off,
    /// unauthorized, or does not report a state within the configured timeout.
    pub async fn start_scan(&self, duration: Duration) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        match self.state() {
            ScanState::Idle => {}
            ScanState::Scanning => return Err(Error::ScanInProgress),
            ScanState::Stopped(_) => return Err(Error::SessionStopped),
        }

        let deadline = Instant::now().checked_add(duration).ok_or_else(|| {
            Error::InvalidArgument(format!("scan duration {:?} cannot be scheduled", duration))
        })?;

        // Subscribe before querying the radio so no state update can slip in between.
        let mut events = self.central.events().await?;
        self.ensure_radio(&mut events).await?;

        self.central.begin_scan(self.host_filter()).await?;

        let (cancel_sender, cancel_receiver) = oneshot::channel();
        *self.cancel.lock().await = Some(cancel_sender);
        self.shared.state.send_replace(ScanState::Scanning);
        self.shared.registry.emit(ScanEvent::Started);
        info!(
            "Scanning for {:?} (device {:?}) for {:?}",
            self.config.services, self.config.device, duration
        );

        let driver = ScanDriver {
            central: self.central.clone(),
            shared: self.shared.clone(),
            filter: DiscoveryFilter::from(&self.config),
            stop_on_match: self.config.stop_on_match,
            connect: self.config.connect,
            connecting: None,
        };
        tokio::spawn(driver.run(events, deadline, cancel_receiver));
        Ok(())
    }

    /// Starts a scan with the configured duration and waits for it to stop.
    pub async fn run(&self) -> Result<StopReason> {
        self.start_scan(self.config.duration).await?;
        self.wait_stopped().await
    }

    /// Stops the running scan and waits until the session is stopped.
    ///
    /// Fails with [`Error::NotScanning`] if no scan was ever started. Stopping a session that has
    /// already stopped does nothing.
    pub async fn stop_scan(&self) -> Result<()> {
        match self.state() {
            ScanState::Idle => return Err(Error::NotScanning),
            ScanState::Stopped(_) => return Ok(()),
            ScanState::Scanning => {}
        }
        if let Some(cancel) = self.cancel.lock().await.take() {
            // The driver may have finished on its own already.
            let _ = cancel.send(());
        }
        self.wait_stopped().await.map(|_| ())
    }

    /// Waits until the current scan stops and returns why it stopped.
    pub async fn wait_stopped(&self) -> Result<StopReason> {
        let mut receiver = self.shared.state.subscribe();
        let state = receiver
            .wait_for(|state| *state != ScanState::Scanning)
            .await
            .map_err(|err| Error::Other(err.into()))?
            .clone();
        match state {
            ScanState::Stopped(reason) => Ok(reason),
            _ => Err(Error::NotScanning),
        }
    }

    /// Returns a stopped session to Idle so it can scan again, forgetting previous discoveries.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        if self.state() == ScanState::Scanning {
            return Err(Error::ScanInProgress);
        }
        self.cancel.lock().await.take();
        self.shared.registry.clear();
        self.shared.state.send_replace(ScanState::Idle);
        debug!("Session reset");
        Ok(())
    }

    /// The filter the host applies before anything reaches the session. Host stacks drop
    /// peripherals that do not advertise a listed service, so a device target needs an
    /// unfiltered scan and is matched by [`DiscoveryFilter`] instead.
    fn host_filter(&self) -> ScanFilter {
        if self.config.device.is_some() {
            ScanFilter::default()
        } else {
            ScanFilter {
                services: self.config.services.clone(),
            }
        }
    }

    async fn ensure_radio(&self, events: &mut EventStream) -> Result<()> {
        let mut state = self.central.adapter_state().await?;
        if state == CentralState::Unknown {
            debug!(
                "Radio state unknown, waiting up to {:?} for an update",
                self.config.state_timeout
            );
            let update = async {
                while let Some(event) = events.next().await {
                    if let CentralEvent::StateUpdate(update) = event {
                        trace!("Radio state update: {}", update);
                        if update != CentralState::Unknown {
                            return update;
                        }
                    }
                }
                CentralState::Unknown
            };
            state = time::timeout(self.config.state_timeout, update)
                .await
                .unwrap_or(CentralState::Unknown);
        }
        if state.is_usable() {
            Ok(())
        } else {
            warn!("Radio unavailable: {}", state);
            Err(Error::RadioUnavailable(state))
        }
    }
}

/// Owns the event loop of one running scan.
struct ScanDriver<C: Central> {
    central: C,
    shared: Arc<Shared>,
    filter: DiscoveryFilter,
    stop_on_match: bool,
    connect: bool,
    connecting: Option<PeripheralId>,
}

impl<C: Central> ScanDriver<C> {
    async fn run(
        mut self,
        mut events: EventStream,
        deadline: Instant,
        mut cancel: oneshot::Receiver<()>,
    ) {
        let timer = time::sleep_until(deadline);
        tokio::pin!(timer);
        let reason = loop {
            tokio::select! {
                biased;
                // A dropped sender means the session itself is gone.
                _ = &mut cancel => break StopReason::Cancelled,
                _ = &mut timer => break StopReason::Elapsed,
                event = events.next() => match event {
                    Some(event) => {
                        if let Some(reason) = self.handle(event).await {
                            break reason;
                        }
                    }
                    None => break StopReason::HostClosed,
                },
            }
        };
        if let Err(err) = self.central.stop_scan().await {
            warn!("Failed to stop scan on host: {}", err);
        }
        self.shared.finish(reason);
    }

    async fn handle(&mut self, event: CentralEvent) -> Option<StopReason> {
        match event {
            CentralEvent::DeviceDiscovered {
                id,
                advertisement,
                rssi,
            } => {
                let Some(matched) = self.filter.matches(&id, &advertisement) else {
                    trace!("Ignoring {}: no target matched", id);
                    return None;
                };
                let discovery = Discovery {
                    id: id.clone(),
                    advertisement,
                    rssi,
                    matched,
                };
                if !self.shared.registry.record(discovery.clone()) {
                    return None;
                }
                info!("Discovered {}", discovery);
                self.shared.registry.emit(ScanEvent::Discovered(discovery));

                if self.connect {
                    if self.connecting.is_none() {
                        return self.begin_connect(id).await;
                    }
                    None
                } else if self.stop_on_match {
                    Some(StopReason::Matched)
                } else {
                    None
                }
            }
            CentralEvent::DeviceConnected(id) if self.connecting.as_ref() == Some(&id) => {
                info!("Connected to {}", id);
                self.shared.registry.emit(ScanEvent::Connected(id.clone()));
                Some(StopReason::Connected(id))
            }
            CentralEvent::DeviceConnectionFailed { id, reason }
                if self.connecting.as_ref() == Some(&id) =>
            {
                Some(self.connection_failed(id, reason))
            }
            CentralEvent::StateUpdate(state) => {
                debug!("Radio state changed to {}", state);
                self.shared.registry.emit(ScanEvent::StateChanged(state));
                match state {
                    CentralState::PoweredOff | CentralState::Unauthorized => {
                        Some(StopReason::RadioUnavailable(state))
                    }
                    CentralState::PoweredOn | CentralState::Unknown => None,
                }
            }
            other => {
                trace!("Ignoring central event {:?}", other);
                None
            }
        }
    }

    async fn begin_connect(&mut self, id: PeripheralId) -> Option<StopReason> {
        debug!("Connecting to {}", id);
        match self.central.connect(&id).await {
            Ok(()) => {
                self.connecting = Some(id);
                None
            }
            Err(err) => Some(self.connection_failed(id, err.to_string())),
        }
    }

    fn connection_failed(&self, id: PeripheralId, reason: String) -> StopReason {
        warn!("Connection to {} failed: {}", id, reason);
        self.shared.registry.emit(ScanEvent::ConnectionFailed {
            id: id.clone(),
            reason: reason.clone(),
        });
        StopReason::ConnectionFailed { id, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::bleuuid::uuid_from_u16;
    use crate::api::Advertisement;
    use crate::simulated::SimulatedCentral;

    fn hello_advertisement() -> Advertisement {
        Advertisement::with_services([HELLO_SERVICE_UUID])
    }

    async fn powered_session() -> (SimulatedCentral, ScanSession<SimulatedCentral>) {
        let central = SimulatedCentral::new(CentralState::PoweredOn);
        let session = ScanSession::new(central.clone()).await.unwrap();
        (central, session)
    }

    async fn next_discovery(
        events: &mut Pin<Box<dyn Stream<Item = ScanEvent> + Send>>,
    ) -> Option<Discovery> {
        while let Some(event) = events.next().await {
            match event {
                ScanEvent::Discovered(discovery) => return Some(discovery),
                ScanEvent::Stopped(_) => return None,
                _ => {}
            }
        }
        None
    }

    #[tokio::test]
    async fn released_handle_is_rejected() {
        let central = SimulatedCentral::new(CentralState::PoweredOn);
        central.release();
        assert!(matches!(
            ScanSession::new(central).await,
            Err(Error::InvalidHandle)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_stops_after_duration_without_matches() {
        let (central, mut session) = powered_session().await;
        session.parse_arguments(["--duration", "5"]).unwrap();
        assert_eq!(session.config().duration, Duration::from_secs(5));

        let started = Instant::now();
        session.start_scan(session.config().duration).await.unwrap();
        assert_eq!(session.state(), ScanState::Scanning);
        assert!(central.is_scanning());
        // The default device target needs every advertisement.
        assert_eq!(central.scan_filter(), Some(ScanFilter::default()));

        let reason = session.wait_stopped().await.unwrap();
        assert_eq!(reason, StopReason::Elapsed);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(session.state(), ScanState::Stopped(StopReason::Elapsed));
        assert!(session.discoveries().is_empty());
        assert!(!central.is_scanning());
        assert_eq!(central.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_duration_reaches_stopped() {
        for millis in [0u64, 1, 250, 3_000, 60_000] {
            let (_central, session) = powered_session().await;
            let duration = Duration::from_millis(millis);
            let started = Instant::now();
            session.start_scan(duration).await.unwrap();
            let reason = time::timeout(duration + Duration::from_millis(1), session.wait_stopped())
                .await
                .expect("scan did not stop in time")
                .unwrap();
            assert_eq!(reason, StopReason::Elapsed);
            assert!(started.elapsed() >= duration);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn matching_service_reported_and_others_filtered() {
        let (central, session) = powered_session().await;
        let mut events = session.events();
        session.start_scan(Duration::from_secs(5)).await.unwrap();

        assert!(central.advertise(
            PeripheralId::new("other"),
            Advertisement::with_services([uuid_from_u16(0x180f)]),
            Some(-40),
        ));
        assert!(central.advertise(PeripheralId::new("band"), hello_advertisement(), Some(-70)));
        // A repeated advertisement is not reported twice.
        central.advertise(PeripheralId::new("band"), hello_advertisement(), Some(-65));

        let discovery = next_discovery(&mut events).await.unwrap();
        assert_eq!(discovery.id, PeripheralId::new("band"));
        assert_eq!(discovery.matched, MatchKind::SERVICE);
        assert_eq!(discovery.rssi, Some(-70));

        assert_eq!(next_discovery(&mut events).await, None);
        assert_eq!(session.discoveries().len(), 1);
        let stored = session.discovery(&PeripheralId::new("band")).unwrap();
        assert_eq!(stored.rssi, Some(-65));
        assert!(session.discovery(&PeripheralId::new("other")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn target_device_found_without_advertised_services() {
        let (central, session) = powered_session().await;
        let mut events = session.events();
        session.start_scan(Duration::from_secs(5)).await.unwrap();

        let id = PeripheralId::from(HELLO_DEVICE_UUID);
        assert!(central.advertise(id.clone(), Advertisement::default(), Some(-58)));
        let discovery = next_discovery(&mut events).await.unwrap();
        assert_eq!(discovery.id, id);
        assert_eq!(discovery.matched, MatchKind::DEVICE);
    }

    #[tokio::test(start_paused = true)]
    async fn service_only_targets_filter_at_the_host() {
        let central = SimulatedCentral::new(CentralState::PoweredOn);
        let config = ScanConfig {
            device: None,
            ..Default::default()
        };
        let session = ScanSession::with_config(central.clone(), config).await.unwrap();
        session.start_scan(Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            central.scan_filter().unwrap().services,
            vec![HELLO_SERVICE_UUID]
        );
        assert!(!central.advertise(
            PeripheralId::new("other"),
            Advertisement::with_services([uuid_from_u16(0x180f)]),
            None,
        ));
        assert!(central.advertise(PeripheralId::new("band"), hello_advertisement(), None));
    }

    #[tokio::test(start_paused = true)]
    async fn unschedulable_duration_is_rejected_before_scanning() {
        let (central, session) = powered_session().await;
        assert!(matches!(
            session.start_scan(Duration::MAX).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(central.begin_calls(), 0);
        assert!(!central.is_scanning());

        session.start_scan(Duration::from_secs(1)).await.unwrap();
        assert_eq!(session.wait_stopped().await.unwrap(), StopReason::Elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_counts_discoveries_a_slow_subscriber_missed() {
        let (central, session) = powered_session().await;
        let mut events = session.events();
        session.start_scan(Duration::from_secs(5)).await.unwrap();
        for batch in 0..3 {
            for n in 0..100 {
                let id = PeripheralId::new(format!("band-{}-{}", batch, n));
                central.advertise(id, hello_advertisement(), None);
            }
            time::sleep(Duration::from_millis(1)).await;
        }
        session.wait_stopped().await.unwrap();

        let mut seen = 0;
        while let Some(event) = events.next().await {
            match event {
                ScanEvent::Discovered(_) => seen += 1,
                ScanEvent::Stopped(_) => break,
                _ => {}
            }
        }
        assert!(seen < 300);
        assert_eq!(session.discoveries().len(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_on_first_match() {
        let (central, mut session) = powered_session().await;
        session.parse_arguments(["--first", "-d", "30"]).unwrap();
        session.start_scan(session.config().duration).await.unwrap();
        central.advertise(PeripheralId::new("band"), hello_advertisement(), None);
        assert_eq!(session.wait_stopped().await.unwrap(), StopReason::Matched);
        assert!(!central.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_to_first_match() {
        let (central, mut session) = powered_session().await;
        session.parse_arguments(["--connect"]).unwrap();
        let mut events = session.events();
        session.start_scan(Duration::from_secs(30)).await.unwrap();
        let id = PeripheralId::from(HELLO_DEVICE_UUID);
        central.advertise(id.clone(), Advertisement::default(), Some(-50));

        assert_eq!(
            session.wait_stopped().await.unwrap(),
            StopReason::Connected(id.clone())
        );
        let mut saw_connected = false;
        while let Some(event) = events.next().await {
            match event {
                ScanEvent::Connected(connected) => {
                    assert_eq!(connected, id);
                    saw_connected = true;
                }
                ScanEvent::Stopped(_) => break,
                _ => {}
            }
        }
        assert!(saw_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connection_stops_without_retry() {
        let (central, mut session) = powered_session().await;
        session.parse_arguments(["--connect"]).unwrap();
        let id = PeripheralId::new("band");
        central.set_unreachable(id.clone());
        session.start_scan(Duration::from_secs(30)).await.unwrap();
        central.advertise(id.clone(), hello_advertisement(), None);

        match session.wait_stopped().await.unwrap() {
            StopReason::ConnectionFailed { id: failed, .. } => assert_eq!(failed, id),
            other => panic!("unexpected stop reason {:?}", other),
        }
        assert_eq!(central.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn radio_off_is_reported() {
        let (central, session) = powered_session().await;
        central.set_state(CentralState::PoweredOff);
        assert!(matches!(
            session.start_scan(Duration::from_secs(1)).await,
            Err(Error::RadioUnavailable(CentralState::PoweredOff))
        ));
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(central.begin_calls(), 0);

        central.set_state(CentralState::Unauthorized);
        assert!(matches!(
            session.start_scan(Duration::from_secs(1)).await,
            Err(Error::RadioUnavailable(CentralState::Unauthorized))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_state_waits_for_update() {
        let central = SimulatedCentral::new(CentralState::Unknown);
        let session = ScanSession::new(central.clone()).await.unwrap();
        let powering = central.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            powering.set_state(CentralState::PoweredOn);
        });
        session.start_scan(Duration::from_secs(2)).await.unwrap();
        assert_eq!(session.state(), ScanState::Scanning);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_state_times_out() {
        let central = SimulatedCentral::new(CentralState::Unknown);
        let session = ScanSession::new(central.clone()).await.unwrap();
        assert!(matches!(
            session.start_scan(Duration::from_secs(2)).await,
            Err(Error::RadioUnavailable(CentralState::Unknown))
        ));
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn radio_lost_mid_scan_stops() {
        let (central, session) = powered_session().await;
        session.start_scan(Duration::from_secs(30)).await.unwrap();
        central.set_state(CentralState::PoweredOff);
        assert_eq!(
            session.wait_stopped().await.unwrap(),
            StopReason::RadioUnavailable(CentralState::PoweredOff)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (central, session) = powered_session().await;
        assert!(matches!(session.stop_scan().await, Err(Error::NotScanning)));

        session.start_scan(Duration::from_secs(30)).await.unwrap();
        session.stop_scan().await.unwrap();
        assert_eq!(session.state(), ScanState::Stopped(StopReason::Cancelled));
        session.stop_scan().await.unwrap();
        session.stop_scan().await.unwrap();
        assert_eq!(session.state(), ScanState::Stopped(StopReason::Cancelled));
        assert_eq!(central.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_start_is_rejected() {
        let (central, session) = powered_session().await;
        session.start_scan(Duration::from_secs(30)).await.unwrap();
        assert!(matches!(
            session.start_scan(Duration::from_secs(30)).await,
            Err(Error::ScanInProgress)
        ));
        assert_eq!(central.begin_calls(), 1);
        assert!(matches!(session.reset().await, Err(Error::ScanInProgress)));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_session_needs_reset() {
        let (central, session) = powered_session().await;
        session.start_scan(Duration::ZERO).await.unwrap();
        session.wait_stopped().await.unwrap();
        assert!(matches!(
            session.start_scan(Duration::ZERO).await,
            Err(Error::SessionStopped)
        ));

        session.reset().await.unwrap();
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(session.run().await.unwrap(), StopReason::Elapsed);
        assert_eq!(central.begin_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_arguments_keep_configuration() {
        let (_central, mut session) = powered_session().await;
        session.parse_arguments(["-d", "7", "--name", "Band"]).unwrap();
        let before = session.config().clone();
        let bad: [&[&str]; 4] = [&["--duration"], &["--nope"], &["-d", "-1"], &["-s", "xyz"]];
        for args in bad {
            assert!(matches!(
                session.parse_arguments(args.iter().copied()),
                Err(Error::InvalidArgument(_))
            ));
            assert_eq!(session.config(), &before);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_is_frozen_while_scanning() {
        let (_central, mut session) = powered_session().await;
        session.start_scan(Duration::from_secs(30)).await.unwrap();
        assert!(matches!(
            session.parse_arguments(["-d", "1"]),
            Err(Error::ScanInProgress)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_session_cancels_the_scan() {
        let (central, session) = powered_session().await;
        session.start_scan(Duration::from_secs(30)).await.unwrap();
        drop(session);
        time::sleep(Duration::from_millis(1)).await;
        assert!(!central.is_scanning());
    }
}
