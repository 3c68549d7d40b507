//! Hands out bridges to sessions according to each bridge's scope.
//!
//! - `shared` bridges: one child per bridge id, reference counted by
//!   [`BridgeLease`]s. The child is stopped when the last lease is released,
//!   unless it was started eagerly, in which case it stays up until
//!   [`BridgePool::shutdown`]. A shared bridge found failed on acquire is
//!   replaced with a fresh one.
//! - `session` bridges: a private child per lease, stopped on release.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use tg_domain::config::{BridgeConfig, BridgeScope, BridgeStartup};

use crate::bridge::{BridgeSpec, BridgeStatus, StdioBridge};

struct SharedSlot {
    bridge: Arc<StdioBridge>,
    leases: usize,
    pinned: bool,
}

type SharedSlots = Arc<Mutex<HashMap<String, SharedSlot>>>;

pub struct BridgePool {
    configs: Vec<BridgeConfig>,
    shared: SharedSlots,
}

/// A session's handle on one bridge.
///
/// Hand it back with [`BridgePool::release`]. A lease dropped without being
/// released gives up its share the same way, stopping the child in a
/// background task if it was the last holder.
pub struct BridgeLease {
    bridge: Arc<StdioBridge>,
    scope: BridgeScope,
    slots: SharedSlots,
    released: bool,
}

impl BridgeLease {
    pub fn bridge(&self) -> &Arc<StdioBridge> {
        &self.bridge
    }

    pub fn scope(&self) -> BridgeScope {
        self.scope
    }

    /// Give up this lease's share. Returns whether the child should stop.
    fn detach(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        match self.scope {
            BridgeScope::Session => true,
            BridgeScope::Shared => {
                let mut shared = self.slots.lock();
                match shared.get_mut(self.bridge.id()) {
                    Some(slot) if Arc::ptr_eq(&slot.bridge, &self.bridge) => {
                        slot.leases = slot.leases.saturating_sub(1);
                        if slot.leases == 0 && !slot.pinned {
                            shared.remove(self.bridge.id());
                            true
                        } else {
                            false
                        }
                    }
                    // Already replaced after a failure; nobody else gets
                    // this instance any more.
                    _ => true,
                }
            }
        }
    }
}

impl Drop for BridgeLease {
    fn drop(&mut self) {
        if !self.detach() {
            return;
        }
        let bridge = Arc::clone(&self.bridge);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(bridge = %bridge.id(), "stopping bridge of a dropped lease");
                handle.spawn(async move { bridge.shutdown().await });
            }
            Err(_) => {
                tracing::warn!(bridge = %bridge.id(), "lease dropped outside a runtime; child not stopped");
            }
        }
    }
}

impl std::fmt::Debug for BridgeLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeLease")
            .field("bridge", &self.bridge.id())
            .field("scope", &self.scope)
            .field("released", &self.released)
            .finish()
    }
}

/// Snapshot of one live bridge for health output.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeInfo {
    pub id: String,
    pub scope: BridgeScope,
    pub status: BridgeStatus,
    pub leases: usize,
    pub in_flight: usize,
    pub pid: Option<u32>,
}

impl BridgePool {
    pub fn new(configs: Vec<BridgeConfig>) -> Arc<Self> {
        Arc::new(Self {
            configs,
            shared: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn configs(&self) -> &[BridgeConfig] {
        &self.configs
    }

    /// Start every shared bridge configured with `startup = "eager"`.
    ///
    /// Failures are logged and the bridge is left failed; the next acquire
    /// replaces it. Returns how many started.
    pub async fn start_eager(&self) -> usize {
        let mut started = 0;
        for cfg in &self.configs {
            if cfg.scope != BridgeScope::Shared || cfg.startup != BridgeStartup::Eager {
                continue;
            }
            let bridge = {
                let mut shared = self.shared.lock();
                let slot = shared.entry(cfg.id.clone()).or_insert_with(|| SharedSlot {
                    bridge: Arc::new(StdioBridge::new(BridgeSpec::from(cfg))),
                    leases: 0,
                    pinned: true,
                });
                slot.pinned = true;
                Arc::clone(&slot.bridge)
            };
            match bridge.start().await {
                Ok(()) => started += 1,
                Err(e) => {
                    tracing::warn!(bridge = %cfg.id, error = %e, "eager bridge failed to start");
                }
            }
        }
        started
    }

    /// One lease per configured bridge, in configuration order.
    pub fn acquire_all(&self) -> Vec<BridgeLease> {
        self.configs.iter().map(|cfg| self.acquire(cfg)).collect()
    }

    /// Lease the bridge described by `cfg`. Does not start it.
    pub fn acquire(&self, cfg: &BridgeConfig) -> BridgeLease {
        let bridge = match cfg.scope {
            BridgeScope::Session => Arc::new(StdioBridge::new(BridgeSpec::from(cfg))),
            BridgeScope::Shared => {
                let mut shared = self.shared.lock();
                let slot = shared.entry(cfg.id.clone()).or_insert_with(|| SharedSlot {
                    bridge: Arc::new(StdioBridge::new(BridgeSpec::from(cfg))),
                    leases: 0,
                    pinned: false,
                });
                if slot.bridge.status() == BridgeStatus::Failed {
                    tracing::info!(bridge = %cfg.id, "replacing failed shared bridge");
                    slot.bridge = Arc::new(StdioBridge::new(BridgeSpec::from(cfg)));
                    slot.leases = 0;
                }
                slot.leases += 1;
                Arc::clone(&slot.bridge)
            }
        };
        BridgeLease {
            bridge,
            scope: cfg.scope,
            slots: Arc::clone(&self.shared),
            released: false,
        }
    }

    /// Give a lease back, stopping the child if nothing else needs it.
    pub async fn release(&self, mut lease: BridgeLease) {
        if lease.detach() {
            lease.bridge.shutdown().await;
        }
    }

    /// Stop every shared bridge, pinned or not.
    pub async fn shutdown(&self) {
        let bridges: Vec<Arc<StdioBridge>> = self
            .shared
            .lock()
            .drain()
            .map(|(_, slot)| slot.bridge)
            .collect();
        futures_util::future::join_all(bridges.iter().map(|b| b.shutdown())).await;
    }

    /// Shared bridges currently held by the pool.
    pub fn shared_bridges(&self) -> Vec<BridgeInfo> {
        let shared = self.shared.lock();
        let mut out: Vec<BridgeInfo> = shared
            .values()
            .map(|slot| BridgeInfo {
                id: slot.bridge.id().to_owned(),
                scope: BridgeScope::Shared,
                status: slot.bridge.status(),
                leases: slot.leases,
                in_flight: slot.bridge.in_flight(),
                pid: slot.bridge.pid(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn shared_count(&self) -> usize {
        self.shared.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(id: &str, scope: BridgeScope) -> BridgeConfig {
        BridgeConfig {
            id: id.into(),
            command: "/nonexistent/bridge-binary".into(),
            scope,
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn shared_leases_share_one_bridge() {
        let c = cfg("fs", BridgeScope::Shared);
        let pool = BridgePool::new(vec![c.clone()]);
        let a = pool.acquire(&c);
        let b = pool.acquire(&c);
        assert!(Arc::ptr_eq(a.bridge(), b.bridge()));
        assert_eq!(pool.shared_bridges()[0].leases, 2);

        pool.release(a).await;
        assert_eq!(pool.shared_count(), 1);
        pool.release(b).await;
        assert_eq!(pool.shared_count(), 0);
    }

    #[tokio::test]
    async fn session_leases_are_private() {
        let c = cfg("scratch", BridgeScope::Session);
        let pool = BridgePool::new(vec![c.clone()]);
        let a = pool.acquire(&c);
        let b = pool.acquire(&c);
        assert!(!Arc::ptr_eq(a.bridge(), b.bridge()));
        assert_eq!(pool.shared_count(), 0);
        pool.release(a).await;
        assert_eq!(b.bridge().status(), BridgeStatus::NotStarted);
    }

    #[tokio::test]
    async fn failed_shared_bridge_is_replaced() {
        let c = cfg("fs", BridgeScope::Shared);
        let pool = BridgePool::new(vec![c.clone()]);
        let first = pool.acquire(&c);
        assert!(first.bridge().start().await.is_err());
        assert_eq!(first.bridge().status(), BridgeStatus::Failed);

        let second = pool.acquire(&c);
        assert!(!Arc::ptr_eq(first.bridge(), second.bridge()));
        assert_eq!(second.bridge().status(), BridgeStatus::NotStarted);

        // Releasing the stale lease leaves the replacement alone.
        pool.release(first).await;
        assert_eq!(pool.shared_bridges()[0].leases, 1);
        pool.release(second).await;
        assert_eq!(pool.shared_count(), 0);
    }

    #[tokio::test]
    async fn eager_bridges_stay_pinned() {
        let mut c = cfg("fs", BridgeScope::Shared);
        c.startup = BridgeStartup::Eager;
        let pool = BridgePool::new(vec![c.clone()]);
        assert_eq!(pool.start_eager().await, 0);
        assert_eq!(pool.shared_count(), 1);

        let lease = pool.acquire(&c);
        pool.release(lease).await;
        assert_eq!(pool.shared_count(), 1);

        pool.shutdown().await;
        assert_eq!(pool.shared_count(), 0);
    }

    #[tokio::test]
    async fn dropped_lease_gives_up_its_share() {
        let c = cfg("fs", BridgeScope::Shared);
        let pool = BridgePool::new(vec![c.clone()]);
        drop(pool.acquire(&c));
        assert_eq!(pool.shared_count(), 0);

        let a = pool.acquire(&c);
        let b = pool.acquire(&c);
        drop(a);
        assert_eq!(pool.shared_bridges()[0].leases, 1);
        pool.release(b).await;
        assert_eq!(pool.shared_count(), 0);
    }
}
