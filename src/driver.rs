//! The listening socket, the shared accessory graph, and the lifecycle
//! that ties a process's network identity to the rest of the protocol
//! core.
//!
//! One [`Driver`] owns everything a connection needs read-only or
//! lock-guarded access to; every accepted TCP connection gets its own
//! [`crate::connection::Connection`] task wired to a cloned [`Shared`]
//! handle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::events::EventBus;
use crate::handler::Capabilities;
use crate::mdns::Advertiser;
use crate::model::Accessory;
use crate::state::State;
use crate::{AsyncMutex, Config};

struct Inner {
    state: AsyncMutex<State>,
    accessories: AsyncMutex<Vec<Accessory>>,
    capabilities: Capabilities,
    events: EventBus,
    persist_path: PathBuf,
    republish_tx: mpsc::UnboundedSender<()>,
}

/// Cheaply cloned handle to everything a connection needs. Every clone
/// refers to the same underlying locks and registries.
#[derive(Clone)]
pub struct Shared(Arc<Inner>);

impl Shared {
    pub(crate) fn state(&self) -> &AsyncMutex<State> {
        &self.0.state
    }

    pub(crate) fn accessories(&self) -> &AsyncMutex<Vec<Accessory>> {
        &self.0.accessories
    }

    pub(crate) fn capabilities(&self) -> &Capabilities {
        &self.0.capabilities
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.0.events
    }

    /// Schedules an async write-through of `state` to `persist_path`.
    /// Fire-and-forget: a failed persist is logged, not propagated, since
    /// the in-memory state it describes is already authoritative.
    pub(crate) fn request_persist(&self) {
        let shared = self.clone();
        tokio::spawn(async move {
            let state = shared.0.state.lock().await;
            if let Err(e) = crate::persist::save_atomic(&shared.0.persist_path, &state).await {
                warn!(error = %e, "failed to persist state");
            }
        });
    }

    /// Signals the driver's mDNS loop to unregister and re-register its
    /// service record — used on every `paired` transition, `config_version`
    /// bump, or listening address change.
    pub(crate) fn request_republish(&self) {
        let _ = self.0.republish_tx.send(());
    }
}

/// Owns the listening socket and the accept loop. Constructed once per
/// process from a loaded or freshly generated [`State`] and the
/// accessory graph it serves.
pub struct Driver {
    shared: Shared,
    listener: TcpListener,
    advertiser: Advertiser,
    republish_rx: mpsc::UnboundedReceiver<()>,
    config: Config,
}

impl Driver {
    /// Binds the listening socket and registers the initial mDNS record.
    pub async fn bind(
        config: Config,
        state: State,
        accessories: Vec<Accessory>,
        capabilities: Capabilities,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.address, config.port)).await?;
        let (republish_tx, republish_rx) = mpsc::unbounded_channel();

        let advertiser = Advertiser::new(&config, &state)?;

        let shared = Shared(Arc::new(Inner {
            state: AsyncMutex::new(state),
            accessories: AsyncMutex::new(accessories),
            capabilities,
            events: EventBus::new(),
            persist_path: config.persist_path.clone(),
            republish_tx,
        }));

        Ok(Self {
            shared,
            listener,
            advertiser,
            republish_rx,
            config,
        })
    }

    #[must_use]
    pub fn shared(&self) -> Shared {
        self.shared.clone()
    }

    /// Accepts connections until `cancel` fires, spawning one
    /// [`Connection`] task per socket. Each connection is cancelled along
    /// with the driver; in-flight snapshot requests are dropped rather
    /// than awaited. Every registered `Run` capability is started here and
    /// left running for the driver's lifetime; every registered `Stop`
    /// capability is invoked once, synchronously, after the accept loop
    /// exits.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(address = %self.config.address, port = self.config.port, "accessory server listening");
        {
            let state = self.shared.0.state.lock().await;
            self.advertiser.republish(&self.config, &state).await;
        }

        for capability in self.shared.0.capabilities.run.values() {
            let capability = capability.clone();
            let run_cancel = cancel.child_token();
            tokio::spawn(async move {
                tokio::select! {
                    () = capability.run() => {}
                    () = run_cancel.cancelled() => {}
                }
            });
        }

        let mut children: HashMap<std::net::SocketAddr, CancellationToken> = HashMap::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,

                Some(()) = self.republish_rx.recv() => {
                    let state = self.shared.0.state.lock().await;
                    self.advertiser.republish(&self.config, &state).await;
                }

                accepted = self.listener.accept() => {
                    let Ok((stream, peer)) = accepted else { continue };
                    let child_cancel = cancel.child_token();
                    children.insert(peer, child_cancel.clone());
                    let connection = Connection::new(peer, self.shared.clone());
                    tokio::spawn(async move {
                        connection.run(stream, child_cancel).await;
                    });
                }
            }
        }

        for token in children.into_values() {
            token.cancel();
        }
        for capability in self.shared.0.capabilities.stop.values() {
            capability.stop();
        }
        self.advertiser.unregister().await;
    }
}
