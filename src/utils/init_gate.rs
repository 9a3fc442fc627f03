//! Brings the hosted database client online.
//!
//! The client needs two things that show up independently at startup: the
//! runtime configuration and the client library ("connector"). Each one is
//! an awaitable [`Dependency`] slot filled by whoever produces it. The
//! [`InitGate`] makes a bounded number of construction attempts: the first
//! immediately, the k-th retry after `k × delay_unit`, returning early when a
//! missing dependency arrives. After the last failed attempt the gate sits in
//! `Failed` until an operator calls [`InitGate::retry`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::api::db_client::{ClientHandle, Connector};
use crate::config::RuntimeConfig;
use crate::error::InitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitPolicy {
    pub delay_unit: Duration,
    pub max_attempts: u32,
}

impl Default for InitPolicy {
    fn default() -> Self {
        Self {
            delay_unit: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

impl InitPolicy {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.delay_unit * attempt
    }
}

/// A value that is set once by its producer and can be awaited by consumers.
pub struct Dependency<T: ?Sized> {
    slot: watch::Sender<Option<Arc<T>>>,
}

impl<T: ?Sized + Send + Sync> Dependency<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Stores the value. Later calls are ignored and return false.
    pub fn provide(&self, value: Arc<T>) -> bool {
        let mut value = Some(value);
        self.slot.send_if_modified(|current| {
            if current.is_none() {
                *current = value.take();
                true
            } else {
                false
            }
        })
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.borrow().clone()
    }

    pub fn is_present(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub async fn ready(&self) -> Arc<T> {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // the sender lives in self, so this only errs if self is gone
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl<T: ?Sized + Send + Sync> Default for Dependency<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub enum GateState {
    Idle,
    Waiting { attempt: u32 },
    Ready(ClientHandle),
    Failed { attempts: u32 },
}

impl GateState {
    pub fn label(&self) -> &'static str {
        match self {
            GateState::Idle => "idle",
            GateState::Waiting { .. } => "waiting",
            GateState::Ready(_) => "ready",
            GateState::Failed { .. } => "failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, GateState::Ready(_))
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, GateState::Ready(_) | GateState::Failed { .. })
    }
}

impl fmt::Debug for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Idle => write!(f, "Idle"),
            GateState::Waiting { attempt } => write!(f, "Waiting {{ attempt: {} }}", attempt),
            GateState::Ready(_) => write!(f, "Ready"),
            GateState::Failed { attempts } => write!(f, "Failed {{ attempts: {} }}", attempts),
        }
    }
}

pub struct InitGate {
    config: Arc<Dependency<RuntimeConfig>>,
    connector: Arc<Dependency<dyn Connector>>,
    policy: InitPolicy,
    state: watch::Sender<GateState>,
    started: AtomicBool,
    // one attempt sequence at a time; a manual retry queues behind a running one
    run_lock: Mutex<()>,
}

impl InitGate {
    pub fn new(
        config: Arc<Dependency<RuntimeConfig>>,
        connector: Arc<Dependency<dyn Connector>>,
        policy: InitPolicy,
    ) -> Self {
        let (state, _) = watch::channel(GateState::Idle);
        Self {
            config,
            connector,
            policy,
            state,
            started: AtomicBool::new(false),
            run_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// The shared client, or `NotInitialized` if the gate is not `Ready`.
    /// Never waits.
    pub fn client(&self) -> Result<ClientHandle, InitError> {
        match &*self.state.borrow() {
            GateState::Ready(client) => Ok(client.clone()),
            _ => Err(InitError::NotInitialized),
        }
    }

    /// Like [`client`](Self::client) but reports a failed gate distinctly.
    pub fn require_client(&self) -> Result<ClientHandle, InitError> {
        match &*self.state.borrow() {
            GateState::Ready(client) => Ok(client.clone()),
            GateState::Failed { attempts } => Err(InitError::InitializationFailed { attempts: *attempts }),
            _ => Err(InitError::NotInitialized),
        }
    }

    /// Kicks off the automatic attempt sequence. Only the first call does
    /// anything; later calls return `None`.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<GateState>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }
        tracing::info!("Starting database client initialization");
        let gate = Arc::clone(self);
        Some(tokio::spawn(async move { gate.run().await }))
    }

    /// Operator-triggered re-initialization: fresh attempt budget, and a
    /// successful construction replaces the published client. When a client
    /// is already `Ready` it keeps serving throughout, and stays published
    /// if every attempt fails; the returned state is still `Failed` then.
    pub async fn retry(&self) -> GateState {
        tracing::info!("Manual database client initialization triggered");
        self.started.store(true, Ordering::Release);
        self.run().await
    }

    /// Waits until the gate is `Ready` or `Failed`.
    pub async fn wait_settled(&self) -> GateState {
        let mut rx = self.state.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                if current.is_settled() {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    async fn run(&self) -> GateState {
        let _running = self.run_lock.lock().await;
        let max_attempts = self.policy.max_attempts;
        // a working client stays published until its replacement exists
        let serving = self.client().is_ok();

        for attempt in 1..=max_attempts {
            if !serving {
                self.state.send_replace(GateState::Waiting { attempt });
            }
            tracing::debug!(
                "Database client init attempt {}/{} (config: {}, connector: {})",
                attempt,
                max_attempts,
                self.config.is_present(),
                self.connector.is_present()
            );

            match self.try_construct() {
                Ok(client) => {
                    self.state.send_replace(GateState::Ready(client));
                    tracing::info!("Database client initialized on attempt {}/{}", attempt, max_attempts);
                    return self.state();
                }
                Err(reason) => {
                    if attempt < max_attempts {
                        let delay = self.policy.delay_after(attempt);
                        tracing::warn!(
                            "Database client init attempt {}/{} failed ({}), retrying in {:?}",
                            attempt,
                            max_attempts,
                            reason,
                            delay
                        );
                        self.pause(delay).await;
                    }
                }
            }
        }

        tracing::error!(
            "Database client initialization failed after {} attempts (config: {}, connector: {})",
            max_attempts,
            self.config.is_present(),
            self.connector.is_present()
        );
        if serving {
            tracing::error!("Keeping the previously initialized database client");
        } else {
            self.state.send_replace(GateState::Failed { attempts: max_attempts });
        }
        GateState::Failed { attempts: max_attempts }
    }

    fn try_construct(&self) -> Result<ClientHandle, String> {
        let config = self
            .config
            .get()
            .ok_or_else(|| "runtime configuration not loaded".to_string())?;
        let connector = self
            .connector
            .get()
            .ok_or_else(|| "client library not loaded".to_string())?;
        connector.create_client(&config).map_err(|e| e.to_string())
    }

    /// Sleeps for `delay`, cut short when the dependencies that were missing
    /// all arrive. With nothing missing (construction itself failed) this is
    /// a plain sleep.
    async fn pause(&self, delay: Duration) {
        if self.config.is_present() && self.connector.is_present() {
            tokio::time::sleep(delay).await;
            return;
        }
        let arrived = async {
            self.config.ready().await;
            self.connector.ready().await;
        };
        if tokio::time::timeout(delay, arrived).await.is_ok() {
            tracing::debug!("Init dependencies arrived, retrying early");
        }
    }
}
