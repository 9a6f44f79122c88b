//! Correlation of asynchronous callbacks (workqueue items, timers,
//! interrupt-deferred work) back to the context that scheduled them.
//!
//! When a context schedules async work it registers an [`AsyncEvent`]
//! carrying a *snapshot* of its own control-block state — PTID, current
//! context tag, last basic block — copied by value into the event's
//! `host` field. The snapshot is deliberately a copy, not a pointer back
//! to the live control block: by the time the callback actually runs, the
//! scheduling thread's control block may have moved on to unrelated work,
//! been reused for a different task with the same PTID, or (for a
//! short-lived kernel thread) been torn down entirely. A back-pointer
//! would read whatever is live at callback time, which is not what
//! scheduled the work; a snapshot captures the truth at scheduling time
//! and stays correct no matter how long the callback is deferred.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dart_protocol::Ptid;

use crate::hashmap::OpenAddressedMap;

const EVENT_TABLE_BITS: u32 = 12;

/// A point-in-time copy of the scheduling context's control-block state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSnapshot {
    pub ptid: Ptid,
    pub ctxt: u64,
    pub last_blk: u64,
}

pub struct AsyncEvent {
    pub id: u64,
    pub func: u64,
    pub info: u64,
    pub host: HostSnapshot,
    serving: AtomicBool,
}

impl AsyncEvent {
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }
}

pub struct AsyncRegistry {
    events: OpenAddressedMap<Arc<AsyncEvent>, EVENT_TABLE_BITS>,
}

impl AsyncRegistry {
    pub fn new() -> Self {
        AsyncRegistry { events: OpenAddressedMap::new() }
    }

    /// Registers a scheduled callback, snapshotting the caller's state.
    pub fn register(&self, id: u64, func: u64, info: u64, host: HostSnapshot) -> Arc<AsyncEvent> {
        self.events.get_or_insert_with(id, || {
            Arc::new(AsyncEvent { id, func, info, host, serving: AtomicBool::new(false) })
        })
    }

    /// Marks event `id` as now being served (the deferred context has
    /// started running it), returning the registered event so the caller
    /// can recover the original scheduler's snapshot for race correlation.
    pub fn begin_serving(&self, id: u64) -> Option<Arc<AsyncEvent>> {
        let event = self.events.get(id)?;
        event.serving.store(true, Ordering::Release);
        Some(event)
    }

    pub fn find(&self, id: u64) -> Option<Arc<AsyncEvent>> {
        self.events.get(id)
    }
}

impl Default for AsyncRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_serve_recovers_host_snapshot() {
        let registry = AsyncRegistry::new();
        let host = HostSnapshot { ptid: Ptid::kernel_task(1), ctxt: 42, last_blk: 7 };
        registry.register(100, 0xdead, 0, host);

        let served = registry.begin_serving(100).unwrap();
        assert_eq!(served.host, host);
        assert!(served.is_serving());
    }

    #[test]
    fn snapshot_survives_even_if_original_ptid_is_reused() {
        let registry = AsyncRegistry::new();
        let scheduler_snapshot = HostSnapshot { ptid: Ptid::user_task(50), ctxt: 1, last_blk: 2 };
        registry.register(1, 0, 0, scheduler_snapshot);

        // Simulate the scheduling task's pid being reused by something else
        // entirely; the registered event's snapshot must not change.
        let event = registry.find(1).unwrap();
        assert_eq!(event.host.ptid, Ptid::user_task(50));
    }

    #[test]
    fn unknown_event_id_is_not_servable() {
        let registry = AsyncRegistry::new();
        assert!(registry.begin_serving(999).is_none());
    }
}
