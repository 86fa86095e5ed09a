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

//! Pulse ECS - Archetype ECS simulation core
//!
//! Generational entities, archetype-grouped SoA storage, a superset-match
//! query engine, and a phase-ordered frame pipeline with deferred
//! structural changes.

pub mod app;
pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event_bus;
pub mod input;
pub mod pipeline;
pub mod prelude;
pub mod query;
pub mod snapshot;
pub mod time;
pub mod world;

#[cfg(feature = "parallel")]
pub mod parallel;

#[cfg(feature = "profiling")]
pub mod profiling;

pub use app::*;
pub use archetype::*;
pub use command::*;
pub use component::*;
pub use entity::*;
pub use error::*;
pub use event_bus::*;
pub use input::*;
pub use pipeline::*;
pub use query::*;
pub use snapshot::*;
pub use time::*;
pub use world::*;
