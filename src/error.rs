// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

use crate::entity::Entity;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// Entity not found
    EntityNotFound,

    /// Component not found
    ComponentNotFound,

    /// Operation used a handle whose generation no longer matches
    StaleEntity {
        entity: Entity,
        current_generation: u32,
    },

    /// Two distinct component types registered under the same name
    DuplicateTypeName(String),

    /// Component type was never registered
    UnregisteredComponent(&'static str),

    /// Event-bus per-type listener cap reached
    ListenerLimitExceeded { event: String, limit: usize },

    /// A system hook failed; surfaced on the event bus, never out of update
    SystemError { system: &'static str, message: String },

    /// Worker offload failed; write-back skipped for the tick
    WorkerError { system: &'static str, message: String },

    /// SoA serialize/deserialize of a tagged field failed
    SerializationFailure(String),

    /// Field does not exist on the component's schema
    UnknownField { component: &'static str, field: String },

    /// Field value kind does not match the column kind
    FieldKindMismatch { field: &'static str },
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound => write!(f, "Entity not found"),
            EcsError::ComponentNotFound => write!(f, "Component not found"),
            EcsError::StaleEntity {
                entity,
                current_generation,
            } => write!(
                f,
                "Stale entity handle {entity:?} (current generation {current_generation})"
            ),
            EcsError::DuplicateTypeName(name) => {
                write!(f, "Duplicate component type name: {name}")
            }
            EcsError::UnregisteredComponent(name) => {
                write!(f, "Component type not registered: {name}")
            }
            EcsError::ListenerLimitExceeded { event, limit } => {
                write!(f, "Listener limit ({limit}) exceeded for event '{event}'")
            }
            EcsError::SystemError { system, message } => {
                write!(f, "System '{system}' failed: {message}")
            }
            EcsError::WorkerError { system, message } => {
                write!(f, "Worker for system '{system}' failed: {message}")
            }
            EcsError::SerializationFailure(msg) => write!(f, "Serialization failure: {msg}"),
            EcsError::UnknownField { component, field } => {
                write!(f, "Component '{component}' has no field '{field}'")
            }
            EcsError::FieldKindMismatch { field } => {
                write!(f, "Value kind does not match column kind for field '{field}'")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
