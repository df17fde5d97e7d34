//! System trait and identifiers.

use crate::entity::Entity;
use crate::error::Result;
use crate::query::Matcher;
use crate::scene::Scene;

/// System ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

/// A unit of per-tick logic bound to a matcher.
///
/// Each tick the scheduler calls `on_begin`, `process` with the matched
/// entities, then `on_end`, in that order. A returned error is reported
/// as a `system:error` event and the tick continues with the next system.
///
/// `process` receives a snapshot of the matched entities, so adding or
/// removing components (or destroying entities) during the pass is safe;
/// handles that went stale mid-pass simply fail their generation check.
pub trait System: Send + Sync {
    /// Get system name
    fn name(&self) -> &'static str;

    /// Query definition deciding which entities this system sees.
    fn matcher(&self) -> Matcher;

    /// Lower runs earlier. Ties run in registration order.
    fn update_order(&self) -> i32 {
        0
    }

    /// Receive disabled entities too.
    fn include_disabled(&self) -> bool {
        false
    }

    /// Called once when the system is registered with a scene.
    fn on_added(&mut self, _scene: &mut Scene) {}

    /// Called once when the system is removed from a scene.
    fn on_removed(&mut self, _scene: &mut Scene) {}

    /// Called at the start of every tick, before `process`.
    fn on_begin(&mut self, _scene: &mut Scene, _delta_time: f32) -> Result<()> {
        Ok(())
    }

    /// Run per-tick logic over the matched entities.
    fn process(&mut self, entities: &[Entity], scene: &mut Scene, delta_time: f32) -> Result<()>;

    /// Called at the end of every tick, after `process`.
    fn on_end(&mut self, _scene: &mut Scene, _delta_time: f32) -> Result<()> {
        Ok(())
    }
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;
