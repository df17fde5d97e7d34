//! Worker entity system: per-frame heavy computation offloaded to the
//! rayon pool while ECS mutation stays on the scheduler thread.
//!
//! Each tick the adapter extracts one flat row per matched entity,
//! ships the batch (plus delta time and a config snapshot) to a worker,
//! and writes results back by re-resolving every handle, dropping rows
//! whose entity was destroyed or disabled in between. Worker failures
//! surface as `system:worker-error` events and skip the write-back.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam::channel::{bounded, Receiver};
use tracing::{debug, error};

use crate::entity::Entity;
use crate::error::Result;
use crate::events::{WorkerErrorEvent, SYSTEM_WORKER_ERROR};
use crate::query::Matcher;
use crate::scene::Scene;
use crate::system::System;

/// User-supplied contract for an offloaded system.
///
/// `compute` is an associated function on purpose: it gets rows, delta
/// time and the config snapshot and nothing else, so it cannot reach
/// entity handles or scene state from the worker thread.
pub trait WorkerSystem: Send + Sync + 'static {
    /// Flat per-entity projection shipped to the worker.
    type Row: Send + Sync + 'static;
    /// Immutable configuration snapshot taken at dispatch.
    type Config: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn matcher(&self) -> Matcher;

    fn update_order(&self) -> i32 {
        0
    }

    /// Configuration snapshot for the next batch.
    fn config(&self) -> Self::Config;

    /// Field count per row; a pre-sizing hint for embedders that marshal
    /// rows into flat transfer buffers.
    fn default_row_size(&self) -> usize {
        0
    }

    /// Pure projection of relevant state into a flat row. Returning None
    /// excludes the entity from the batch.
    fn extract(&self, scene: &Scene, entity: Entity) -> Option<Self::Row>;

    /// Pure transformation of the batch; runs on a worker thread.
    fn compute(rows: Vec<Self::Row>, delta_time: f32, config: &Self::Config)
        -> Result<Vec<Self::Row>>;

    /// Write one result row back onto its entity.
    fn apply(&self, scene: &mut Scene, entity: Entity, row: Self::Row);
}

/// When results are awaited relative to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Dispatch and await within the same tick (default).
    Blocking,
    /// Dispatch and poll for results on a later tick.
    Deferred(PendingPolicy),
}

/// What a new tick does while the previous batch is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPolicy {
    /// Drop this tick's batch (default).
    Skip,
    /// Extract this tick's batch now and dispatch it once the pending
    /// one resolves. Only the most recent tick's batch is kept.
    Queue,
}

type BatchResult<R> = std::result::Result<Vec<R>, String>;

struct InFlight<R> {
    entities: Vec<Entity>,
    receiver: Receiver<BatchResult<R>>,
}

struct ExtractedBatch<R> {
    entities: Vec<Entity>,
    rows: Vec<R>,
    delta_time: f32,
}

/// [`System`] adapter that drives a [`WorkerSystem`] through the
/// extract / dispatch / await / apply cycle. At most one batch per
/// system is in flight at any time.
pub struct WorkerEntitySystem<W: WorkerSystem> {
    worker: W,
    mode: DispatchMode,
    in_flight: Option<InFlight<W::Row>>,
    queued: Option<ExtractedBatch<W::Row>>,
}

impl<W: WorkerSystem> WorkerEntitySystem<W> {
    pub fn new(worker: W) -> Self {
        Self::with_mode(worker, DispatchMode::Blocking)
    }

    pub fn with_mode(worker: W, mode: DispatchMode) -> Self {
        Self {
            worker,
            mode,
            in_flight: None,
            queued: None,
        }
    }

    /// Whether a batch is awaiting results (deferred mode only).
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    fn extract_batch(
        &self,
        scene: &Scene,
        entities: &[Entity],
        delta_time: f32,
    ) -> Option<ExtractedBatch<W::Row>> {
        let mut rows = Vec::with_capacity(entities.len());
        let mut extracted = Vec::with_capacity(entities.len());
        for &entity in entities {
            if let Some(row) = self.worker.extract(scene, entity) {
                rows.push(row);
                extracted.push(entity);
            }
        }
        if extracted.is_empty() {
            return None;
        }
        Some(ExtractedBatch {
            entities: extracted,
            rows,
            delta_time,
        })
    }

    fn dispatch(&mut self, batch: ExtractedBatch<W::Row>) {
        let config = self.worker.config();
        let (sender, receiver) = bounded(1);
        let rows = batch.rows;
        let delta_time = batch.delta_time;
        rayon::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                W::compute(rows, delta_time, &config)
            }));
            let result = match outcome {
                Ok(Ok(rows)) => Ok(rows),
                Ok(Err(err)) => Err(err.to_string()),
                Err(panic) => Err(panic_message(&panic)),
            };
            // The orchestrator may already have given up on this batch
            let _ = sender.send(result);
        });

        self.in_flight = Some(InFlight {
            entities: batch.entities,
            receiver,
        });
    }

    fn apply_results(
        &mut self,
        scene: &mut Scene,
        result: BatchResult<W::Row>,
        entities: Vec<Entity>,
    ) {
        match result {
            Ok(rows) => {
                if rows.len() != entities.len() {
                    self.report_error(
                        scene,
                        format!(
                            "worker returned {} rows for {} entities",
                            rows.len(),
                            entities.len()
                        ),
                    );
                    return;
                }
                for (entity, row) in entities.into_iter().zip(rows) {
                    // Re-resolve: the entity may have died or been
                    // disabled between dispatch and completion.
                    if !scene.is_alive(entity) || !scene.is_enabled(entity) {
                        debug!(?entity, "dropping worker result for stale entity");
                        continue;
                    }
                    self.worker.apply(scene, entity, row);
                }
            }
            Err(message) => self.report_error(scene, message),
        }
    }

    fn report_error(&self, scene: &mut Scene, message: String) {
        let system = self.worker.name();
        error!(system, message, "worker batch failed; write-back skipped");
        scene.event_bus_mut().emit_sync(
            SYSTEM_WORKER_ERROR,
            &WorkerErrorEvent { system, message },
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

impl<W: WorkerSystem> System for WorkerEntitySystem<W> {
    fn name(&self) -> &'static str {
        self.worker.name()
    }

    fn matcher(&self) -> Matcher {
        self.worker.matcher()
    }

    fn update_order(&self) -> i32 {
        self.worker.update_order()
    }

    fn process(&mut self, entities: &[Entity], scene: &mut Scene, delta_time: f32) -> Result<()> {
        // Resolve a previously dispatched batch first
        if let Some(in_flight) = self.in_flight.take() {
            match in_flight.receiver.try_recv() {
                Ok(result) => {
                    self.apply_results(scene, result, in_flight.entities);
                    // A batch queued while pending goes out before any
                    // fresh extraction.
                    if let Some(queued) = self.queued.take() {
                        self.dispatch(queued);
                        return Ok(());
                    }
                }
                Err(crossbeam::channel::TryRecvError::Empty) => {
                    // Still running; keep at most one batch in flight
                    if let DispatchMode::Deferred(PendingPolicy::Queue) = self.mode {
                        self.queued = self.extract_batch(scene, entities, delta_time);
                    }
                    self.in_flight = Some(in_flight);
                    return Ok(());
                }
                Err(crossbeam::channel::TryRecvError::Disconnected) => {
                    self.report_error(scene, "worker dropped its result channel".to_string());
                }
            }
        }

        let Some(batch) = self.extract_batch(scene, entities, delta_time) else {
            return Ok(());
        };
        match self.mode {
            DispatchMode::Blocking => {
                self.dispatch(batch);
                if let Some(in_flight) = self.in_flight.take() {
                    match in_flight.receiver.recv() {
                        Ok(result) => self.apply_results(scene, result, in_flight.entities),
                        Err(_) => {
                            self.report_error(
                                scene,
                                "worker dropped its result channel".to_string(),
                            );
                        }
                    }
                }
            }
            DispatchMode::Deferred(_) => {
                self.dispatch(batch);
            }
        }
        Ok(())
    }
}
