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

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity handle is stale or was never allocated (generation mismatch)
    InvalidEntity,

    /// Entity's archetype does not contain the requested component type
    MissingComponent,

    /// Structural mutation attempted while the world is frozen for a frame
    /// or an in-flight iteration
    ConcurrentStructuralChange,

    /// Component type has no entry in the snapshot registry
    UnregisteredComponent(String),

    /// A pipeline stage hook failed
    StageError(String),

    /// Batch size too large
    BatchTooLarge,

    /// Serialization error
    SerializationError(String),

    /// Deserialization error
    DeserializationError(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidEntity => write!(f, "Invalid or stale entity handle"),
            EcsError::MissingComponent => write!(f, "Component not present on entity"),
            EcsError::ConcurrentStructuralChange => {
                write!(f, "Structural change attempted during iteration")
            }
            EcsError::UnregisteredComponent(name) => {
                write!(f, "Component type not registered: {name}")
            }
            EcsError::StageError(msg) => write!(f, "Stage error: {msg}"),
            EcsError::BatchTooLarge => write!(f, "Batch size too large (max 10,000,000)"),
            EcsError::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            EcsError::DeserializationError(msg) => write!(f, "Deserialization error: {msg}"),
            EcsError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<std::io::Error> for EcsError {
    fn from(err: std::io::Error) -> Self {
        EcsError::IoError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            EcsError::InvalidEntity.to_string(),
            "Invalid or stale entity handle"
        );
        assert!(EcsError::UnregisteredComponent("demo::Sprite".into())
            .to_string()
            .contains("demo::Sprite"));
    }
}
