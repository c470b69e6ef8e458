//! Channel registry: lifecycle of minted and attached channels.
//!
//! A channel is MINTED by the minting endpoint, ATTACHED by exactly one
//! successful tunnel upgrade and DETACHED (removed) when that tunnel
//! closes. The registry lock is never held across transport I/O; writes
//! to an attached tunnel are serialised by the per-channel mutex that
//! also holds the tunnel slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hookline_proto::ChannelInventory;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

/// A freshly generated channel id collided with an existing one.
#[derive(Error, Debug)]
#[error("channel id collision: {0}")]
pub struct IdCollision(pub String);

/// Why an attach attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// The id was never minted here (or has already been detached or
    /// reaped).
    NotFound,
    /// Another tunnel already won the attach.
    AlreadyAttached,
}

/// Per-channel state. `T` is the tunnel write half.
#[derive(Debug)]
pub struct ChannelState<T> {
    id: String,
    minted_at: Instant,
    tunnel: Mutex<Option<T>>,
    attached: AtomicBool,
    closed: CancellationToken,
}

impl<T> ChannelState<T> {
    fn new(id: String) -> Self {
        Self {
            id,
            minted_at: Instant::now(),
            tunnel: Mutex::new(None),
            attached: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock-free view of the lifecycle phase, suitable for snapshots.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Fires when the channel is detached; in-flight webhook waits use
    /// this to distinguish "tunnel gone" from "no answer yet".
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Acquires the per-channel write mutex guarding the tunnel slot.
    pub async fn tunnel(&self) -> MutexGuard<'_, Option<T>> {
        self.tunnel.lock().await
    }
}

/// In-memory map of every channel owned by this broker.
pub struct ChannelRegistry<T> {
    inner: RwLock<HashMap<String, Arc<ChannelState<T>>>>,
    id_gen: Box<dyn Fn() -> String + Send + Sync>,
}

impl<T> std::fmt::Debug for ChannelRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry").finish_non_exhaustive()
    }
}

impl<T> Default for ChannelRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChannelRegistry<T> {
    /// Registry with UUID v4 channel ids.
    pub fn new() -> Self {
        Self::with_id_generator(|| uuid::Uuid::new_v4().to_string())
    }

    /// Registry with an injected id generator.
    pub fn with_id_generator(id_gen: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            id_gen: Box::new(id_gen),
        }
    }

    /// Allocates a fresh id and inserts it in MINTED state.
    pub async fn mint(&self) -> Result<String, IdCollision> {
        let id = (self.id_gen)();
        let mut map = self.inner.write().await;
        if map.contains_key(&id) {
            return Err(IdCollision(id));
        }
        map.insert(id.clone(), Arc::new(ChannelState::new(id.clone())));
        Ok(id)
    }

    /// Read-only snapshot of one channel's state.
    pub async fn lookup(&self, id: &str) -> Option<Arc<ChannelState<T>>> {
        self.inner.read().await.get(id).cloned()
    }

    /// Transitions MINTED to ATTACHED iff the channel exists and has no
    /// tunnel. On rejection the tunnel is handed back so the caller can
    /// close it.
    ///
    /// Two-phase: the registry lock is only held for the lookup and the
    /// liveness re-check; the install itself happens under the
    /// per-channel mutex, so a racing second attach observes the winner
    /// and is rejected.
    pub async fn attach(
        &self,
        id: &str,
        tunnel: T,
    ) -> Result<Arc<ChannelState<T>>, (AttachError, T)> {
        let state = match self.inner.read().await.get(id).cloned() {
            Some(state) => state,
            None => return Err((AttachError::NotFound, tunnel)),
        };

        let mut slot = state.tunnel.lock().await;
        if slot.is_some() {
            return Err((AttachError::AlreadyAttached, tunnel));
        }

        // Holding the slot lock keeps the reaper off this state (it
        // only removes states whose slot it can acquire), so a key
        // still present here stays present until the install lands.
        // Detach removes the key before taking the slot, so an absent
        // key means the channel is gone for good.
        if !self.inner.read().await.contains_key(id) {
            return Err((AttachError::NotFound, tunnel));
        }

        *slot = Some(tunnel);
        state.attached.store(true, Ordering::Release);
        drop(slot);

        Ok(state)
    }

    /// Removes the channel and yields its tunnel (if any) for closing.
    /// Idempotent; the single source of truth for "channel gone".
    pub async fn detach(&self, id: &str) -> Option<T> {
        let state = self.inner.write().await.remove(id)?;
        state.attached.store(false, Ordering::Release);
        state.closed.cancel();
        let tunnel = state.tunnel.lock().await.take();
        tunnel
    }

    /// Removes every MINTED state older than `max_age`; returns the
    /// reaped ids.
    pub async fn reap(&self, max_age: Duration) -> Vec<String> {
        let mut reaped = Vec::new();
        let mut map = self.inner.write().await;
        map.retain(|id, state| {
            if state.is_attached() || state.minted_at.elapsed() <= max_age {
                return true;
            }
            // A held slot lock means an attach is mid-install; leave
            // the state for the next cycle.
            match state.tunnel.try_lock() {
                Ok(slot) if slot.is_none() => {
                    reaped.push(id.clone());
                    false
                }
                _ => true,
            }
        });
        reaped
    }

    /// All channel ids currently registered.
    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Consistent inventory snapshot for the given advertised address.
    pub async fn snapshot(&self, server_url: &str) -> ChannelInventory {
        let map = self.inner.read().await;
        let mut inventory = ChannelInventory::new(server_url);
        for (id, state) in map.iter() {
            inventory.ws_channels.insert(id.clone());
            if state.is_attached() {
                inventory.webhook_channels.insert(id.clone());
            }
        }
        inventory
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
