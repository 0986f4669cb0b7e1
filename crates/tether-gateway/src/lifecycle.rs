//! Start/stop state machine and the transport polling loop

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tether_config::GatewayConfig;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::dispatcher::EventDispatcher;
use crate::error::{GatewayError, Result};
use crate::events::DisconnectReason;
use crate::identity::IdentityRegistry;
use crate::router::TransportSlot;
use crate::transport::{dispatch_event, Transport, TransportFactory, TransportListener, TransportOptions};

/// Owns the transport for the duration of one run.
///
/// `start` and `stop` are serialized by an async mutex. `is_running` reads a
/// flag and never waits on that mutex.
pub(crate) struct LifecycleController {
    config: GatewayConfig,
    factory: Arc<dyn TransportFactory>,
    registry: Arc<IdentityRegistry>,
    dispatcher: Arc<EventDispatcher>,
    transport: TransportSlot,
    running: AtomicBool,
    /// Cancels the polling loop of the current run
    run: Mutex<Option<CancellationToken>>,
}

impl LifecycleController {
    pub(crate) fn new(
        config: GatewayConfig,
        factory: Arc<dyn TransportFactory>,
        registry: Arc<IdentityRegistry>,
        dispatcher: Arc<EventDispatcher>,
        transport: TransportSlot,
    ) -> Self {
        Self {
            config,
            factory,
            registry,
            dispatcher,
            transport,
            running: AtomicBool::new(false),
            run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validate the config, bind a fresh transport and begin polling it.
    ///
    /// On failure the controller stays idle and nothing is left bound.
    pub async fn start(&self, port: u16, listener: Weak<dyn TransportListener>) -> Result<()> {
        let mut run = self.run.lock().await;
        if self.is_running() {
            warn!(port, "Gateway start requested while already running");
            return Err(GatewayError::AlreadyRunning);
        }

        self.config.validate().map_err(|e| {
            warn!(port, "Refusing to start with invalid config: {}", e);
            GatewayError::Config(e)
        })?;

        let transport = self.factory.create(&TransportOptions::from(&self.config));
        transport
            .start(port)
            .map_err(|source| GatewayError::Bind { port, source })?;

        *self.transport.write() = Some(Arc::clone(&transport));

        // set before the first poll; connect callbacks read it
        self.running.store(true, Ordering::SeqCst);
        let token = CancellationToken::new();
        spawn_polling_loop(
            transport,
            listener,
            token.clone(),
            self.config.tick_interval(),
            port,
        );
        *run = Some(token);

        info!(port, "Gateway started");
        Ok(())
    }

    /// Tear the current run down. Does nothing when idle.
    ///
    /// Every live client gets a `ServerShutdown` disconnect event before this
    /// returns. Those events are published after the guarded section, so an
    /// observer may call back into `start` or `stop` while handling them.
    pub async fn stop(&self) {
        let shutdown = {
            let mut run = self.run.lock().await;
            if !self.running.swap(false, Ordering::SeqCst) {
                return;
            }

            if let Some(token) = run.take() {
                token.cancel();
            }

            let transport = self.transport.write().take();
            // a disconnect callback still in flight finds nothing left to remove
            let sessions = self.registry.drain();
            if let Some(transport) = &transport {
                for (_, peer) in &sessions {
                    transport.disconnect(*peer);
                }
            }
            if let Some(transport) = transport {
                transport.stop();
            }
            sessions
        };

        for (client_id, _) in &shutdown {
            self.dispatcher
                .notify_disconnected(*client_id, DisconnectReason::ServerShutdown)
                .await;
        }

        info!(clients = shutdown.len(), "Gateway stopped");
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        if let Some(token) = self.run.get_mut().take() {
            token.cancel();
        }
        if let Some(transport) = self.transport.write().take() {
            transport.stop();
        }
    }
}

/// Poll `transport` once per tick until cancelled or until the listener is gone.
///
/// The task is never joined. Stopping the gateway from inside an observer
/// would otherwise wait on the very task running that observer.
fn spawn_polling_loop(
    transport: Arc<dyn Transport>,
    listener: Weak<dyn TransportListener>,
    token: CancellationToken,
    tick: Duration,
    port: u16,
) {
    let span = tether_observability::gateway_span(port);
    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let Some(listener) = listener.upgrade() else {
                    break;
                };

                for event in transport.poll_events() {
                    if token.is_cancelled() {
                        break;
                    }
                    dispatch_event(transport.as_ref(), listener.as_ref(), event).await;
                }
            }

            debug!("Polling loop exited");
        }
        .instrument(span),
    );
}
