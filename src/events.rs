//! Core event types published on the scene event bus.

use std::any::Any;
use std::sync::Arc;

use crate::component::ComponentTypeId;
use crate::entity::Entity;
use crate::event_bus::Event;

/// Bus name for entity creation.
pub const ENTITY_CREATED: &str = "entity:created";
/// Bus name for entity destruction.
pub const ENTITY_DESTROYED: &str = "entity:destroyed";
/// Bus name for component addition.
pub const COMPONENT_ADDED: &str = "component:added";
/// Bus name for component removal.
pub const COMPONENT_REMOVED: &str = "component:removed";
/// Bus name for system hook failures.
pub const SYSTEM_ERROR: &str = "system:error";
/// Bus name for worker offload failures.
pub const SYSTEM_WORKER_ERROR: &str = "system:worker-error";

/// Macro for defining events with automatic Event trait implementation
#[macro_export]
macro_rules! define_event {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            $(pub $field : $ty),*
        }

        impl $crate::event_bus::Event for $name {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn event_name(&self) -> &str {
                stringify!($name)
            }
        }
    };

    // Support for unit structs (no fields)
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name;

        impl $crate::event_bus::Event for $name {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn event_name(&self) -> &str {
                stringify!($name)
            }
        }
    };
}

define_event! {
    /// An entity was created in the scene.
    pub struct EntityCreated {
        entity: Entity,
    }
}

define_event! {
    /// An entity was destroyed; the handle is already stale.
    pub struct EntityDestroyed {
        entity: Entity,
    }
}

define_event! {
    /// A component type was added to an entity.
    pub struct ComponentAdded {
        entity: Entity,
        type_id: ComponentTypeId,
    }
}

define_event! {
    /// A component type was removed from an entity.
    pub struct ComponentRemoved {
        entity: Entity,
        type_id: ComponentTypeId,
    }
}

define_event! {
    /// A system hook failed during the tick.
    pub struct SystemErrorEvent {
        system: &'static str,
        message: String,
    }
}

define_event! {
    /// A worker offload failed; write-back was skipped for the tick.
    pub struct WorkerErrorEvent {
        system: &'static str,
        message: String,
    }
}

/// Payload of a drained event batch, published as `"{type}:batch"`.
pub struct BatchEvent {
    /// Original event name the batch was collected for.
    pub type_name: String,
    pub events: Vec<Arc<dyn Event>>,
    pub count: usize,
    /// Milliseconds since the unix epoch at drain time.
    pub timestamp: u64,
}

impl Event for BatchEvent {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn event_name(&self) -> &str {
        "BatchEvent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_event! {
        struct Ping {
            sequence: u32,
        }
    }

    #[test]
    fn test_define_event_names() {
        let ping = Ping { sequence: 7 };
        assert_eq!(ping.event_name(), "Ping");
        assert!(ping.as_any().downcast_ref::<Ping>().is_some());
    }
}
