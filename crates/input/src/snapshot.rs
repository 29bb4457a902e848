use std::collections::HashSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Platform-independent key identifiers the engine binds actions to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    W,
    A,
    S,
    D,
    Q,
    E,
    Space,
    Shift,
    Control,
    Escape,
    Tab,
    P,
    N,
    F1,
    F2,
    F3,
    F4,
    F5,
}

/// Everything the frame loop learned from the window since the last frame.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    held: HashSet<Key>,
    pressed: HashSet<Key>,
    mouse_delta: Vec2,
    mouse_look: bool,
    resize: Option<(u32, u32)>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: Key) {
        // Key repeat must not re-trigger the edge.
        if self.held.insert(key) {
            self.pressed.insert(key);
        }
    }

    pub fn key_up(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn mouse_moved(&mut self, delta: Vec2) {
        self.mouse_delta += delta;
    }

    pub fn set_mouse_look(&mut self, enabled: bool) {
        self.mouse_look = enabled;
    }

    /// Later resizes within one frame replace earlier ones.
    pub fn resized(&mut self, width: u32, height: u32) {
        self.resize = Some((width, height));
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    pub fn was_pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    pub fn held_keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.held.iter().copied()
    }

    pub fn pressed_keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.pressed.iter().copied()
    }

    /// Accumulated mouse motion; zero while mouse-look is off.
    pub fn mouse_delta(&self) -> Vec2 {
        if self.mouse_look {
            self.mouse_delta
        } else {
            Vec2::ZERO
        }
    }

    pub fn mouse_look(&self) -> bool {
        self.mouse_look
    }

    pub fn pending_resize(&self) -> Option<(u32, u32)> {
        self.resize
    }

    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.resize.take()
    }

    /// Clear per-frame state. Held keys survive.
    pub fn end_frame(&mut self) {
        self.pressed.clear();
        self.mouse_delta = Vec2::ZERO;
        self.resize = None;
    }

    /// Drop everything, e.g. when the window loses focus.
    pub fn reset(&mut self) {
        self.held.clear();
        self.end_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_an_edge_and_hold_persists() {
        let mut input = InputSnapshot::new();
        input.key_down(Key::W);
        assert!(input.was_pressed(Key::W));
        assert!(input.is_held(Key::W));

        input.end_frame();
        assert!(!input.was_pressed(Key::W));
        assert!(input.is_held(Key::W));

        // Auto-repeat while held does not count as a new press.
        input.key_down(Key::W);
        assert!(!input.was_pressed(Key::W));

        input.key_up(Key::W);
        assert!(!input.is_held(Key::W));
    }

    #[test]
    fn mouse_delta_accumulates_only_with_mouse_look() {
        let mut input = InputSnapshot::new();
        input.mouse_moved(Vec2::new(3.0, 1.0));
        assert_eq!(input.mouse_delta(), Vec2::ZERO);

        input.set_mouse_look(true);
        input.mouse_moved(Vec2::new(1.0, 1.0));
        assert_eq!(input.mouse_delta(), Vec2::new(4.0, 2.0));

        input.end_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn last_resize_wins_and_is_taken_once() {
        let mut input = InputSnapshot::new();
        input.resized(800, 600);
        input.resized(1024, 768);
        assert_eq!(input.take_resize(), Some((1024, 768)));
        assert_eq!(input.take_resize(), None);
    }

    #[test]
    fn reset_clears_held_keys() {
        let mut input = InputSnapshot::new();
        input.key_down(Key::Shift);
        input.reset();
        assert!(!input.is_held(Key::Shift));
    }
}
