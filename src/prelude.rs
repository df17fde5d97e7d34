//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use scene_ecs::prelude::*;
//! ```

pub use crate::component::{
    component_id, register_component, register_soa_component, ComponentTypeId, FieldDescriptor,
    FieldKind, FieldValue, SoaComponent,
};
pub use crate::entity::Entity;
pub use crate::error::{EcsError, Result};
pub use crate::event_bus::{BatchConfig, Event, EventBus, ListenerId, SubscribeOptions};
pub use crate::events::BatchEvent;
pub use crate::query::Matcher;
pub use crate::scene::Scene;
pub use crate::system::{System, SystemId};

#[cfg(feature = "parallel")]
pub use crate::worker::{DispatchMode, PendingPolicy, WorkerEntitySystem, WorkerSystem};
