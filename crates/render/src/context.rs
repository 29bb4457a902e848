use prism_input::{Action, ActionMap, InputSnapshot};

use crate::shader_registry::ShaderRegistry;

/// Engine-wide state handed from the entry point to whatever needs it:
/// shaders, the input snapshot and key bindings.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub shaders: ShaderRegistry,
    pub input: InputSnapshot,
    pub actions: ActionMap,
    frame: u64,
}

impl RenderContext {
    pub fn new(shaders: ShaderRegistry) -> Self {
        Self {
            shaders,
            ..Self::default()
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// One-shot actions for this frame.
    pub fn triggered(&self) -> Vec<Action> {
        self.actions.triggered(&self.input)
    }

    /// Close the frame: clears per-frame input edges.
    pub fn end_frame(&mut self) {
        self.input.end_frame();
        self.frame += 1;
    }
}
