//! String-named event bus with priorities, one-shot listeners, async
//! handlers and batching.
//!
//! Synchronous dispatch runs handlers in descending priority, stable
//! within a priority; handler errors are logged and never abort the rest.
//! `emit` additionally runs async-marked handlers after the synchronous
//! ones and only returns once all of them finished. Batched event names
//! enqueue instead of dispatching; queues drain when they reach their
//! configured size or, on `pump()`, once their delay elapsed.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use slotmap::{new_key_type, SlotMap};
use tracing::{error, warn};

use crate::error::{EcsError, Result};
use crate::events::BatchEvent;

/// Per-type listener cap; exceeding it rejects the registration.
pub const MAX_LISTENERS_PER_TYPE: usize = 100;

/// Trait for any payload published on the bus.
pub trait Event: Send + Sync + 'static {
    /// Downcast to concrete type
    fn as_any(&self) -> &dyn Any;

    /// Event name for debugging
    fn event_name(&self) -> &str {
        "UnnamedEvent"
    }
}

type Handler = Arc<dyn Fn(&dyn Event) -> Result<()> + Send + Sync>;

new_key_type! {
    /// Generational listener handle; `off` with a stale id is a no-op.
    pub struct ListenerId;
}

/// Registration options for [`EventBus::on_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Higher runs earlier. Ties run in registration order.
    pub priority: i32,
    /// Remove the listener after its first invocation.
    pub once: bool,
    /// Run in the concurrent phase of `emit` instead of inline.
    pub async_: bool,
}

struct Listener {
    type_name: String,
    priority: i32,
    once: bool,
    async_: bool,
    seq: u64,
    handler: Handler,
}

/// Batching knobs for one event name.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub delay: Duration,
    pub enabled: bool,
}

struct BatchQueue {
    config: BatchConfig,
    pending: Vec<Arc<dyn Event>>,
    first_enqueued: Option<Instant>,
}

/// Per-type dispatch statistics.
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub listener_count: usize,
    pub trigger_count: u64,
    pub total_exec_time: Duration,
    pub last_trigger: Option<SystemTime>,
}

impl EventStats {
    pub fn average_exec_time(&self) -> Duration {
        if self.trigger_count == 0 {
            Duration::ZERO
        } else {
            self.total_exec_time / self.trigger_count as u32
        }
    }
}

/// Central event bus for pub/sub communication.
pub struct EventBus {
    listeners: SlotMap<ListenerId, Listener>,
    /// Listener ids per event name, kept sorted by (priority desc, seq asc).
    by_type: AHashMap<String, Vec<ListenerId>>,
    batches: AHashMap<String, BatchQueue>,
    stats: AHashMap<String, EventStats>,
    /// Registration sequence; orders same-priority listeners.
    next_seq: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: SlotMap::with_key(),
            by_type: AHashMap::new(),
            batches: AHashMap::new(),
            stats: AHashMap::new(),
            next_seq: 0,
        }
    }

    /// Subscribe with default options.
    pub fn on<F>(&mut self, type_name: &str, handler: F) -> Result<ListenerId>
    where
        F: Fn(&dyn Event) -> Result<()> + Send + Sync + 'static,
    {
        self.on_with(type_name, SubscribeOptions::default(), handler)
    }

    /// Subscribe with explicit priority / once / async options.
    pub fn on_with<F>(
        &mut self,
        type_name: &str,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<ListenerId>
    where
        F: Fn(&dyn Event) -> Result<()> + Send + Sync + 'static,
    {
        if self.listener_count(type_name) >= MAX_LISTENERS_PER_TYPE {
            warn!(
                event = type_name,
                limit = MAX_LISTENERS_PER_TYPE,
                "listener cap reached; registration rejected (listener leak?)"
            );
            return Err(EcsError::ListenerLimitExceeded {
                event: type_name.to_string(),
                limit: MAX_LISTENERS_PER_TYPE,
            });
        }

        let priority = options.priority;
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.listeners.insert(Listener {
            type_name: type_name.to_string(),
            priority,
            once: options.once,
            async_: options.async_,
            seq,
            handler: Arc::new(handler),
        });

        // Keep dispatch order at registration so emit never sorts. The new
        // listener has the highest seq, so it lands after ties.
        let listeners = &self.listeners;
        let ids = self.by_type.entry(type_name.to_string()).or_default();
        let position = ids
            .iter()
            .position(|&other| listeners[other].priority < priority)
            .unwrap_or(ids.len());
        ids.insert(position, id);

        self.stats
            .entry(type_name.to_string())
            .or_default()
            .listener_count += 1;
        Ok(id)
    }

    /// Remove one listener. Stale or foreign ids are a no-op.
    pub fn off(&mut self, type_name: &str, id: ListenerId) -> bool {
        let Some(listener) = self.listeners.get(id) else {
            return false;
        };
        if listener.type_name != type_name {
            return false;
        }
        self.listeners.remove(id);
        if let Some(ids) = self.by_type.get_mut(type_name) {
            ids.retain(|&other| other != id);
        }
        if let Some(stats) = self.stats.get_mut(type_name) {
            stats.listener_count = stats.listener_count.saturating_sub(1);
        }
        true
    }

    /// Remove every listener for the event name.
    pub fn off_all(&mut self, type_name: &str) {
        if let Some(ids) = self.by_type.remove(type_name) {
            for id in ids {
                self.listeners.remove(id);
            }
        }
        if let Some(stats) = self.stats.get_mut(type_name) {
            stats.listener_count = 0;
        }
    }

    /// Dispatch to non-async listeners immediately. Never suspends and
    /// ignores batching configuration.
    pub fn emit_sync(&mut self, type_name: &str, event: &dyn Event) {
        self.dispatch(type_name, event, false);
    }

    /// Publish an event. Batched names enqueue; otherwise synchronous
    /// listeners run first, then async listeners run concurrently, and
    /// the call returns once every listener finished.
    pub fn emit<E: Event>(&mut self, type_name: &str, event: E) {
        if let Some(queue) = self.batches.get_mut(type_name) {
            if queue.config.enabled {
                if queue.pending.is_empty() {
                    queue.first_enqueued = Some(Instant::now());
                }
                queue.pending.push(Arc::new(event));
                if queue.pending.len() >= queue.config.batch_size {
                    self.drain_batch(type_name);
                }
                return;
            }
        }
        self.dispatch(type_name, &event, true);
    }

    /// Configure batching for one event name. Disabling leaves already
    /// queued events pending until the next `pump()`.
    pub fn set_batch_config(&mut self, type_name: &str, config: BatchConfig) {
        let queue = self
            .batches
            .entry(type_name.to_string())
            .or_insert_with(|| BatchQueue {
                config,
                pending: Vec::new(),
                first_enqueued: None,
            });
        queue.config = config;
    }

    /// Drain every batch queue whose size or delay condition is met.
    /// Called once per scene tick; hosts without a tick loop call it
    /// directly.
    pub fn pump(&mut self) {
        let due: Vec<String> = self
            .batches
            .iter()
            .filter(|(_, queue)| {
                if queue.pending.is_empty() {
                    return false;
                }
                if queue.pending.len() >= queue.config.batch_size {
                    return true;
                }
                queue
                    .first_enqueued
                    .map(|at| at.elapsed() >= queue.config.delay)
                    .unwrap_or(false)
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in due {
            self.drain_batch(&name);
        }
    }

    fn drain_batch(&mut self, type_name: &str) {
        let Some(queue) = self.batches.get_mut(type_name) else {
            return;
        };
        let events = std::mem::take(&mut queue.pending);
        queue.first_enqueued = None;
        if events.is_empty() {
            return;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let batch = BatchEvent {
            type_name: type_name.to_string(),
            count: events.len(),
            events,
            timestamp,
        };
        let batch_name = format!("{type_name}:batch");
        self.dispatch(&batch_name, &batch, true);
    }

    /// Drop all pending batched events. Scene teardown calls this; each
    /// non-empty queue is reported once.
    pub fn discard_pending(&mut self) {
        for (name, queue) in &mut self.batches {
            if !queue.pending.is_empty() {
                warn!(
                    event = name.as_str(),
                    dropped = queue.pending.len(),
                    "dropping batched events pending at teardown"
                );
                queue.pending.clear();
                queue.first_enqueued = None;
            }
        }
    }

    fn dispatch(&mut self, type_name: &str, event: &dyn Event, run_async: bool) {
        let Some(ids) = self.by_type.get(type_name) else {
            return;
        };

        // Snapshot in dispatch order; handlers cannot re-enter the bus
        let mut inline = Vec::new();
        let mut concurrent = Vec::new();
        let mut expired = Vec::new();
        for &id in ids {
            let Some(listener) = self.listeners.get(id) else {
                continue;
            };
            if listener.async_ {
                if run_async {
                    concurrent.push(Arc::clone(&listener.handler));
                    if listener.once {
                        expired.push(id);
                    }
                }
            } else {
                inline.push(Arc::clone(&listener.handler));
                if listener.once {
                    expired.push(id);
                }
            }
        }

        let started = Instant::now();
        for handler in &inline {
            if let Err(err) = handler(event) {
                error!(event = type_name, %err, "event handler failed");
            }
        }

        if !concurrent.is_empty() {
            Self::run_concurrent(type_name, &concurrent, event);
        }

        let elapsed = started.elapsed();
        let stats = self.stats.entry(type_name.to_string()).or_default();
        stats.trigger_count += 1;
        stats.total_exec_time += elapsed;
        stats.last_trigger = Some(SystemTime::now());

        for id in expired {
            self.off(type_name, id);
        }
    }

    #[cfg(feature = "parallel")]
    fn run_concurrent(type_name: &str, handlers: &[Handler], event: &dyn Event) {
        rayon::scope(|scope| {
            for handler in handlers {
                scope.spawn(move |_| {
                    if let Err(err) = handler(event) {
                        error!(event = type_name, %err, "async event handler failed");
                    }
                });
            }
        });
    }

    #[cfg(not(feature = "parallel"))]
    fn run_concurrent(type_name: &str, handlers: &[Handler], event: &dyn Event) {
        for handler in handlers {
            if let Err(err) = handler(event) {
                error!(event = type_name, %err, "async event handler failed");
            }
        }
    }

    /// Listener count for one event name.
    pub fn listener_count(&self, type_name: &str) -> usize {
        self.by_type.get(type_name).map(|ids| ids.len()).unwrap_or(0)
    }

    /// Total listener count across all event names.
    pub fn total_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Dispatch statistics for one event name.
    pub fn stats(&self, type_name: &str) -> Option<&EventStats> {
        self.stats.get(type_name)
    }

    /// Pending batched event count for one event name.
    pub fn pending_batch_len(&self, type_name: &str) -> usize {
        self.batches
            .get(type_name)
            .map(|queue| queue.pending.len())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    define_event! {
        struct Damage {
            amount: f32,
        }
    }

    use crate::define_event;

    #[test]
    fn test_emit_sync_runs_handlers() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let seen = count.clone();
        bus.on("damage", move |event| {
            let damage = event.as_any().downcast_ref::<Damage>().unwrap();
            assert_eq!(damage.amount, 5.0);
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        bus.emit_sync("damage", &Damage { amount: 5.0 });
        bus.emit_sync("damage", &Damage { amount: 5.0 });
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(bus.stats("damage").unwrap().trigger_count, 2);
    }

    #[test]
    fn test_priority_order_stable() {
        let mut bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (tag, priority) in [("low", -1), ("first-high", 10), ("mid", 0), ("second-high", 10)]
        {
            let order = order.clone();
            bus.on_with(
                "tick",
                SubscribeOptions {
                    priority,
                    ..Default::default()
                },
                move |_| {
                    order.lock().unwrap().push(tag);
                    Ok(())
                },
            )
            .unwrap();
        }

        bus.emit_sync("tick", &Damage { amount: 0.0 });
        assert_eq!(
            *order.lock().unwrap(),
            vec!["first-high", "second-high", "mid", "low"]
        );
    }

    #[test]
    fn test_once_listener_runs_once() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let seen = count.clone();
        bus.on_with(
            "tick",
            SubscribeOptions {
                once: true,
                ..Default::default()
            },
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .unwrap();

        bus.emit_sync("tick", &Damage { amount: 0.0 });
        bus.emit_sync("tick", &Damage { amount: 0.0 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("tick"), 0);
    }

    #[test]
    fn test_handler_error_does_not_abort_rest() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.on_with(
            "tick",
            SubscribeOptions {
                priority: 1,
                ..Default::default()
            },
            |_| {
                Err(EcsError::ComponentNotFound)
            },
        )
        .unwrap();
        let seen = count.clone();
        bus.on("tick", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        bus.emit_sync("tick", &Damage { amount: 0.0 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_cap() {
        let mut bus = EventBus::new();
        for _ in 0..MAX_LISTENERS_PER_TYPE {
            bus.on("spam", |_| Ok(())).unwrap();
        }
        let err = bus.on("spam", |_| Ok(())).unwrap_err();
        assert!(matches!(err, EcsError::ListenerLimitExceeded { .. }));
        assert_eq!(bus.listener_count("spam"), MAX_LISTENERS_PER_TYPE);
    }

    #[test]
    fn test_off_removes_listener() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let id = bus
            .on("tick", move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert!(bus.off("tick", id));
        // Stale id: no-op
        assert!(!bus.off("tick", id));
        bus.emit_sync("tick", &Damage { amount: 0.0 });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_batching_by_size() {
        let mut bus = EventBus::new();
        let batches = Arc::new(Mutex::new(Vec::new()));

        let seen = batches.clone();
        bus.on("tick:batch", move |event| {
            let batch = event.as_any().downcast_ref::<crate::events::BatchEvent>().unwrap();
            seen.lock().unwrap().push(batch.count);
            Ok(())
        })
        .unwrap();

        bus.set_batch_config(
            "tick",
            BatchConfig {
                batch_size: 3,
                delay: Duration::from_secs(60),
                enabled: true,
            },
        );

        for _ in 0..7 {
            bus.emit("tick", Damage { amount: 0.0 });
        }
        // Two full batches drained immediately, one event still pending
        assert_eq!(*batches.lock().unwrap(), vec![3, 3]);
        assert_eq!(bus.pending_batch_len("tick"), 1);
    }

    #[test]
    fn test_batching_by_delay() {
        let mut bus = EventBus::new();
        let batches = Arc::new(Mutex::new(Vec::new()));

        let seen = batches.clone();
        bus.on("tick:batch", move |event| {
            let batch = event.as_any().downcast_ref::<crate::events::BatchEvent>().unwrap();
            seen.lock().unwrap().push(batch.count);
            Ok(())
        })
        .unwrap();

        bus.set_batch_config(
            "tick",
            BatchConfig {
                batch_size: 10,
                delay: Duration::from_millis(20),
                enabled: true,
            },
        );

        for _ in 0..4 {
            bus.emit("tick", Damage { amount: 0.0 });
        }
        bus.pump();
        assert!(batches.lock().unwrap().is_empty());

        std::thread::sleep(Duration::from_millis(30));
        bus.pump();
        assert_eq!(*batches.lock().unwrap(), vec![4]);
        assert_eq!(bus.pending_batch_len("tick"), 0);
    }

    #[test]
    fn test_discard_pending() {
        let mut bus = EventBus::new();
        bus.set_batch_config(
            "tick",
            BatchConfig {
                batch_size: 10,
                delay: Duration::from_secs(60),
                enabled: true,
            },
        );
        bus.emit("tick", Damage { amount: 0.0 });
        assert_eq!(bus.pending_batch_len("tick"), 1);

        bus.discard_pending();
        assert_eq!(bus.pending_batch_len("tick"), 0);
    }

    #[test]
    fn test_async_handlers_complete_before_emit_returns() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let seen = count.clone();
            bus.on_with(
                "tick",
                SubscribeOptions {
                    async_: true,
                    ..Default::default()
                },
                move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap();
        }

        bus.emit("tick", Damage { amount: 0.0 });
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
