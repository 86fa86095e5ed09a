//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use pulse_ecs::prelude::*;
//! ```

pub use crate::app::App;
pub use crate::command::CommandBuffer;
pub use crate::component::{Bundle, Component};
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::event_bus::{Event, EventBus};
pub use crate::input::{Input, KeyCode, KeyEvent, KeyboardInput};
pub use crate::pipeline::{Pipeline, Stage, StageAccess};
pub use crate::query::{Entity, Query, QueryMut, QueryState, With, Without};
pub use crate::snapshot::{ComponentRegistry, WorldSnapshot};
pub use crate::time::Time;
pub use crate::world::World;
