//! Input boundary helpers
//!
//! The core never polls devices; an external collaborator publishes
//! [`KeyEvent`]s through the world's event bus and a stage folds them
//! into an [`Input`] tracker with pressed / just-pressed edge states.

use std::collections::HashSet;
use std::hash::Hash;

/// Generic input tracker
#[derive(Clone, Debug)]
pub struct Input<T: Copy + Eq + Hash> {
    pressed: HashSet<T>,
    just_pressed: HashSet<T>,
    just_released: HashSet<T>,
}

impl<T: Copy + Eq + Hash> Default for Input<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq + Hash> Input<T> {
    /// Create new input tracker
    pub fn new() -> Self {
        Self {
            pressed: HashSet::new(),
            just_pressed: HashSet::new(),
            just_released: HashSet::new(),
        }
    }

    /// Press a key/button
    pub fn press(&mut self, input: T) {
        if !self.pressed.contains(&input) {
            self.just_pressed.insert(input);
        }
        self.pressed.insert(input);
    }

    /// Release a key/button
    pub fn release(&mut self, input: T) {
        if self.pressed.contains(&input) {
            self.just_released.insert(input);
        }
        self.pressed.remove(&input);
    }

    /// Check if input is currently pressed
    pub fn pressed(&self, input: T) -> bool {
        self.pressed.contains(&input)
    }

    /// Check if input was just pressed this frame
    pub fn just_pressed(&self, input: T) -> bool {
        self.just_pressed.contains(&input)
    }

    /// Check if input was just released this frame
    pub fn just_released(&self, input: T) -> bool {
        self.just_released.contains(&input)
    }

    /// Clear just_pressed and just_released (call at end of frame)
    pub fn clear_just_changed(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }

    /// Reset all input state
    pub fn reset(&mut self) {
        self.pressed.clear();
        self.just_pressed.clear();
        self.just_released.clear();
    }
}

/// Keyboard key codes understood by the demo stages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
    Space,
    Enter,
    Escape,
    Left,
    Right,
    Up,
    Down,
}

/// Type alias for keyboard input
pub type KeyboardInput = Input<KeyCode>;

/// Discrete key transition supplied by the external input collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub pressed: bool,
}
