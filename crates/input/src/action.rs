use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::snapshot::{InputSnapshot, Key};

/// A high-level action produced from input.
///
/// The camera and renderer consume actions, never raw key state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    MoveForward,
    MoveBack,
    StrafeLeft,
    StrafeRight,
    MoveUp,
    MoveDown,
    Sprint,
    /// Keep culling against the current view while the camera moves on.
    ToggleFrustumFreeze,
    /// Replace geometry with world-space AABB wireframes.
    ToggleCollisionDebug,
    ToggleSsao,
    ToggleCascadeCulling,
    ToggleOverlay,
    ToggleMouseLook,
    ReloadShaders,
    NextAnimation,
    ToggleAnimationPause,
    Quit,
}

impl Action {
    /// Actions that act for as long as their key is held.
    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            Action::MoveForward
                | Action::MoveBack
                | Action::StrafeLeft
                | Action::StrafeRight
                | Action::MoveUp
                | Action::MoveDown
                | Action::Sprint
        )
    }
}

/// Key bindings. One key triggers at most one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMap {
    bindings: BTreeMap<Key, Action>,
}

impl Default for ActionMap {
    fn default() -> Self {
        let bindings = [
            (Key::W, Action::MoveForward),
            (Key::S, Action::MoveBack),
            (Key::A, Action::StrafeLeft),
            (Key::D, Action::StrafeRight),
            (Key::E, Action::MoveUp),
            (Key::Q, Action::MoveDown),
            (Key::Shift, Action::Sprint),
            (Key::F1, Action::ToggleOverlay),
            (Key::F2, Action::ToggleFrustumFreeze),
            (Key::F3, Action::ToggleCollisionDebug),
            (Key::F4, Action::ToggleSsao),
            (Key::F5, Action::ReloadShaders),
            (Key::Tab, Action::ToggleCascadeCulling),
            (Key::Space, Action::ToggleMouseLook),
            (Key::N, Action::NextAnimation),
            (Key::P, Action::ToggleAnimationPause),
            (Key::Escape, Action::Quit),
        ]
        .into_iter()
        .collect();
        Self { bindings }
    }
}

impl ActionMap {
    pub fn empty() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    /// Bind `key`, returning the action it replaced.
    pub fn bind(&mut self, key: Key, action: Action) -> Option<Action> {
        self.bindings.insert(key, action)
    }

    pub fn action_for(&self, key: Key) -> Option<Action> {
        self.bindings.get(&key).copied()
    }

    /// Continuous actions whose key is held this frame.
    pub fn held(&self, input: &InputSnapshot) -> Vec<Action> {
        let mut actions: Vec<Action> = input
            .held_keys()
            .filter_map(|k| self.action_for(k))
            .filter(|a| a.is_continuous())
            .collect();
        actions.sort();
        actions.dedup();
        actions
    }

    /// One-shot actions whose key went down this frame.
    pub fn triggered(&self, input: &InputSnapshot) -> Vec<Action> {
        let mut actions: Vec<Action> = input
            .pressed_keys()
            .filter_map(|k| self.action_for(k))
            .filter(|a| !a.is_continuous())
            .collect();
        actions.sort();
        actions.dedup();
        tracing::trace!(?actions, "triggered actions");
        actions
    }

    /// Camera-local movement intent (x right, y up, z forward), unnormalized.
    pub fn movement(&self, input: &InputSnapshot) -> Vec3 {
        self.held(input)
            .into_iter()
            .fold(Vec3::ZERO, |acc, action| match action {
                Action::MoveForward => acc + Vec3::Z,
                Action::MoveBack => acc - Vec3::Z,
                Action::StrafeRight => acc + Vec3::X,
                Action::StrafeLeft => acc - Vec3::X,
                Action::MoveUp => acc + Vec3::Y,
                Action::MoveDown => acc - Vec3::Y,
                _ => acc,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_movement_keys_sum_to_intent() {
        let map = ActionMap::default();
        let mut input = InputSnapshot::new();
        input.key_down(Key::W);
        input.key_down(Key::D);
        assert_eq!(map.movement(&input), Vec3::new(1.0, 0.0, 1.0));

        input.key_down(Key::S);
        assert_eq!(map.movement(&input), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn toggles_fire_on_press_only() {
        let map = ActionMap::default();
        let mut input = InputSnapshot::new();
        input.key_down(Key::F2);
        assert_eq!(map.triggered(&input), vec![Action::ToggleFrustumFreeze]);
        assert!(map.held(&input).is_empty());

        input.end_frame();
        assert!(map.triggered(&input).is_empty());
    }

    #[test]
    fn rebinding_replaces_previous_action() {
        let mut map = ActionMap::empty();
        assert_eq!(map.bind(Key::F3, Action::ToggleSsao), None);
        assert_eq!(
            map.bind(Key::F3, Action::ToggleCollisionDebug),
            Some(Action::ToggleSsao)
        );
        assert_eq!(map.action_for(Key::F3), Some(Action::ToggleCollisionDebug));
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let map = ActionMap::empty();
        let mut input = InputSnapshot::new();
        input.key_down(Key::W);
        assert_eq!(map.movement(&input), Vec3::ZERO);
        assert!(map.triggered(&input).is_empty());
    }
}
