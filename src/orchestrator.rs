//! Bootstrap orchestrator.
//!
//! The startup decision as an explicit finite-state machine: a pure
//! transition function `(state, event) -> effects` executed by a driver that
//! serializes events on one logical control thread. Collaborator calls are
//! suspend points back onto that thread, so the machine itself needs no
//! locking, and idempotence guards are plain phase checks.
//!
//! Exactly one final outcome (`ShowMain` or `ShowContent`) is emitted per
//! launch. `ShowOffline` is a recoverable detour: the decision re-runs from
//! the connectivity check when reachability returns, guarded so it cannot
//! double-fire once a final outcome is out.

use crate::attribution::AttributionStore;
use crate::connectivity::ConnectivityMonitor;
use crate::permission::PermissionGate;
use crate::resolver::{ConfigResolver, Resolution};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// How long resolution may run before the launch defaults to the main
/// experience. Failure to resolve is never fatal to app usability.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(2);

/// The single value the orchestrator produces, consumed by the presentation
/// layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    ShowMain,
    ShowContent(String),
    ShowOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingConversion,
    CheckingConnectivity,
    GatingPermission,
    ResolvingConfig,
    OfflineWait,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ConversionReceived { is_organic: bool },
    ConnectivityChanged(bool),
    PermissionSettled,
    ResolverSettled(Resolution),
    DeepLink(String),
    FallbackElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RunPermissionGate,
    StartResolver,
    StartFallbackTimer,
    Present(BootstrapOutcome),
}

/// Pure transition function over the launch decision.
pub struct Machine {
    phase: Phase,
    online: bool,
    is_organic: bool,
}

impl Machine {
    pub fn new(online: bool) -> Self {
        Self {
            phase: Phase::AwaitingConversion,
            online,
            is_organic: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply one event. Events that do not fit the current phase — duplicate
    /// conversion signals, late resolver results, connectivity flips mid
    /// decision — are no-ops.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        if self.phase == Phase::Done {
            return Vec::new();
        }

        match event {
            // A deep link always wins over anything still in flight.
            Event::DeepLink(url) => self.finish(BootstrapOutcome::ShowContent(url)),

            Event::ConversionReceived { is_organic } => {
                if self.phase != Phase::AwaitingConversion {
                    return Vec::new();
                }
                self.is_organic = is_organic;
                self.check_connectivity()
            }

            Event::ConnectivityChanged(online) => {
                self.online = online;
                if self.phase == Phase::OfflineWait && online {
                    self.check_connectivity()
                } else {
                    Vec::new()
                }
            }

            Event::PermissionSettled => {
                if self.phase != Phase::GatingPermission {
                    return Vec::new();
                }
                self.start_resolution()
            }

            Event::ResolverSettled(resolution) => {
                if self.phase != Phase::ResolvingConfig {
                    return Vec::new();
                }
                match resolution {
                    Resolution::UseContent(url) => {
                        self.finish(BootstrapOutcome::ShowContent(url))
                    }
                    Resolution::UseMain => self.finish(BootstrapOutcome::ShowMain),
                }
            }

            Event::FallbackElapsed => {
                if self.phase != Phase::ResolvingConfig {
                    return Vec::new();
                }
                self.finish(BootstrapOutcome::ShowMain)
            }
        }
    }

    fn check_connectivity(&mut self) -> Vec<Effect> {
        self.phase = Phase::CheckingConnectivity;
        if !self.online {
            self.phase = Phase::OfflineWait;
            return vec![Effect::Present(BootstrapOutcome::ShowOffline)];
        }
        if self.is_organic {
            self.start_resolution()
        } else {
            self.phase = Phase::GatingPermission;
            vec![Effect::RunPermissionGate]
        }
    }

    fn start_resolution(&mut self) -> Vec<Effect> {
        self.phase = Phase::ResolvingConfig;
        vec![Effect::StartResolver, Effect::StartFallbackTimer]
    }

    fn finish(&mut self, outcome: BootstrapOutcome) -> Vec<Effect> {
        self.phase = Phase::Done;
        vec![Effect::Present(outcome)]
    }
}

/// Sender side for inbound events (deep links from notifications, injected
/// test events).
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl OrchestratorHandle {
    /// Deliver an out-of-band deep-link URL. Pre-empts any pending
    /// resolution; ignored after the final outcome.
    pub fn deep_link(&self, url: &str) {
        let _ = self.tx.send(Event::DeepLink(url.to_string()));
    }
}

pub struct Orchestrator {
    machine: Machine,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    connectivity_rx: watch::Receiver<bool>,
    attribution: Arc<AttributionStore>,
    gate: Arc<PermissionGate>,
    resolver: Arc<ConfigResolver>,
    outcome_tx: watch::Sender<Option<BootstrapOutcome>>,
    fallback: Duration,
}

impl Orchestrator {
    pub fn new(
        connectivity: &ConnectivityMonitor,
        attribution: Arc<AttributionStore>,
        gate: Arc<PermissionGate>,
        resolver: Arc<ConfigResolver>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outcome_tx, _) = watch::channel(None);
        Self {
            machine: Machine::new(connectivity.is_online()),
            events_tx,
            events_rx,
            connectivity_rx: connectivity.subscribe(),
            attribution,
            gate,
            resolver,
            outcome_tx,
            fallback: FALLBACK_TIMEOUT,
        }
    }

    /// Override the resolution fallback window (tests).
    pub fn with_fallback_timeout(mut self, fallback: Duration) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Observe outcomes as they are presented. `ShowOffline` may be followed
    /// by the final outcome after connectivity recovers.
    pub fn outcome(&self) -> watch::Receiver<Option<BootstrapOutcome>> {
        self.outcome_tx.subscribe()
    }

    /// Drive the launch decision to its final outcome.
    pub async fn run(mut self) -> BootstrapOutcome {
        self.spawn_conversion_forwarder();
        self.spawn_connectivity_forwarder();

        loop {
            let Some(event) = self.events_rx.recv().await else {
                // Cannot happen: we hold a sender for the lifetime of run().
                continue;
            };
            debug!(?event, phase = ?self.machine.phase(), "orchestrator.event");

            for effect in self.machine.handle(event) {
                match effect {
                    Effect::RunPermissionGate => {
                        // Interleaved before resolution proceeds; the outcome
                        // never blocks the pipeline.
                        self.gate.run().await;
                        let _ = self.events_tx.send(Event::PermissionSettled);
                    }
                    Effect::StartResolver => {
                        let resolver = self.resolver.clone();
                        let tx = self.events_tx.clone();
                        tokio::spawn(async move {
                            let resolution = resolver.resolve().await;
                            let _ = tx.send(Event::ResolverSettled(resolution));
                        });
                    }
                    Effect::StartFallbackTimer => {
                        let tx = self.events_tx.clone();
                        let fallback = self.fallback;
                        tokio::spawn(async move {
                            tokio::time::sleep(fallback).await;
                            let _ = tx.send(Event::FallbackElapsed);
                        });
                    }
                    Effect::Present(outcome) => {
                        info!(?outcome, "orchestrator.present");
                        self.outcome_tx.send_replace(Some(outcome.clone()));
                        if outcome != BootstrapOutcome::ShowOffline {
                            return outcome;
                        }
                    }
                }
            }
        }
    }

    fn spawn_conversion_forwarder(&self) {
        let attribution = self.attribution.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            attribution.signal().wait().await;
            let is_organic = attribution
                .load()
                .await
                .ok()
                .flatten()
                .is_some_and(|payload| payload.is_organic);
            let _ = tx.send(Event::ConversionReceived { is_organic });
        });
    }

    fn spawn_connectivity_forwarder(&self) {
        let mut rx = self.connectivity_rx.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if tx.send(Event::ConnectivityChanged(online)).is_err() {
                    break;
                }
            }
        });
    }
}
