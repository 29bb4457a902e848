//! Per-frame pass graph: declared resource accesses, validated order, and the
//! state transitions between passes.
//!
//! # Invariants
//! - Insertion order is execution order.
//! - No pass reads a resource that nothing earlier in the frame wrote, unless
//!   the resource was imported as persistent.
//! - Compute passes all precede graphics passes: they are recorded into the
//!   first of the two command buffers submitted each frame.
//! - Exactly one transition is emitted per access-kind change of a resource.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use prism_common::limits::{BLOOM_MIP_COUNT, INDIRECT_BUFFER_SLOTS, SHADOW_MAP_CASCADES};
use serde::Serialize;

use crate::bloom::{BloomStep, bloom_steps};
use crate::config::RendererConfig;

/// How a pass touches a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Access {
    ColorAttachment,
    DepthAttachment,
    Sampled,
    StorageWrite,
    Indirect,
    Present,
}

/// Which command buffer a pass records into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Queue {
    Compute,
    Graphics,
}

/// What a pass does. The backend dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassKind {
    CullMain,
    CullCascade(u32),
    DepthPrepass,
    Ssao,
    Shadow(u32),
    Forward,
    Bloom(BloomStep),
    Composite,
    Overlay,
    Present,
}

impl PassKind {
    pub fn queue(self) -> Queue {
        match self {
            PassKind::CullMain | PassKind::CullCascade(_) => Queue::Compute,
            _ => Queue::Graphics,
        }
    }
}

/// Resource names used by the standard frame.
pub mod resources {
    pub const DEPTH: &str = "depth";
    pub const NORMALS: &str = "normals";
    pub const SSAO: &str = "ssao";
    pub const HDR: &str = "hdr";
    pub const SURFACE: &str = "surface";

    pub fn indirect_slot(slot: usize) -> String {
        format!("indirect.slot{slot}")
    }

    pub fn shadow_layer(layer: u32) -> String {
        format!("shadow.layer{layer}")
    }

    pub fn bloom_mip(mip: u32) -> String {
        format!("bloom.mip{mip}")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("pass {pass:?} reads {resource:?} before anything writes it")]
    ReadBeforeWrite { pass: String, resource: String },
    #[error("pass {0:?} added twice")]
    DuplicatePass(String),
    #[error("compute pass {0:?} follows a graphics pass")]
    ComputeAfterGraphics(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceAccess {
    pub resource: String,
    pub access: Access,
    pub write: bool,
}

/// One pass and the resources it declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassNode {
    pub name: String,
    pub kind: PassKind,
    pub accesses: Vec<ResourceAccess>,
}

impl PassNode {
    pub fn new(name: impl Into<String>, kind: PassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            accesses: Vec::new(),
        }
    }

    pub fn read(mut self, resource: impl Into<String>, access: Access) -> Self {
        self.accesses.push(ResourceAccess {
            resource: resource.into(),
            access,
            write: false,
        });
        self
    }

    pub fn write(mut self, resource: impl Into<String>, access: Access) -> Self {
        self.accesses.push(ResourceAccess {
            resource: resource.into(),
            access,
            write: true,
        });
        self
    }
}

/// A resource changing access kind before `pass` runs. `from == None` is the
/// undefined initial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub pass: usize,
    pub resource: String,
    pub from: Option<Access>,
    pub to: Access,
}

#[derive(Debug, Clone, Default)]
pub struct FrameGraph {
    passes: Vec<PassNode>,
    imported: BTreeSet<String>,
    written: BTreeSet<String>,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource whose contents persist across frames.
    pub fn import(&mut self, resource: impl Into<String>) {
        self.imported.insert(resource.into());
    }

    /// Append a pass, validating it against everything before it.
    pub fn add_pass(&mut self, pass: PassNode) -> Result<(), GraphError> {
        if self.passes.iter().any(|p| p.name == pass.name) {
            return Err(GraphError::DuplicatePass(pass.name));
        }
        if pass.kind.queue() == Queue::Compute
            && self.passes.iter().any(|p| p.kind.queue() == Queue::Graphics)
        {
            return Err(GraphError::ComputeAfterGraphics(pass.name));
        }
        for access in pass.accesses.iter().filter(|a| !a.write) {
            if !self.written.contains(&access.resource) && !self.imported.contains(&access.resource)
            {
                return Err(GraphError::ReadBeforeWrite {
                    pass: pass.name,
                    resource: access.resource.clone(),
                });
            }
        }
        self.written.extend(
            pass.accesses
                .iter()
                .filter(|a| a.write)
                .map(|a| a.resource.clone()),
        );
        self.passes.push(pass);
        Ok(())
    }

    pub fn passes(&self) -> &[PassNode] {
        &self.passes
    }

    /// Derive the ordered transition list.
    pub fn compile(self) -> FramePlan {
        let mut state: BTreeMap<String, Access> = BTreeMap::new();
        let mut transitions = Vec::new();
        for (index, pass) in self.passes.iter().enumerate() {
            for access in &pass.accesses {
                let previous = state.insert(access.resource.clone(), access.access);
                if previous != Some(access.access) {
                    tracing::trace!(
                        pass = %pass.name,
                        resource = %access.resource,
                        from = ?previous,
                        to = ?access.access,
                        "transition"
                    );
                    transitions.push(Transition {
                        pass: index,
                        resource: access.resource.clone(),
                        from: previous,
                        to: access.access,
                    });
                }
            }
        }
        FramePlan {
            passes: self.passes,
            transitions,
        }
    }

    /// The full frame for the given configuration.
    pub fn standard(config: &RendererConfig) -> Result<Self, GraphError> {
        Self::standard_with_bloom_mips(config, BLOOM_MIP_COUNT)
    }

    /// The full frame with a bloom chain of `bloom_mips` levels, which is
    /// shorter than the default on small surfaces.
    pub fn standard_with_bloom_mips(config: &RendererConfig, bloom_mips: u32) -> Result<Self, GraphError> {
        use resources::*;

        let mut graph = Self::new();
        for slot in 0..INDIRECT_BUFFER_SLOTS {
            graph.import(indirect_slot(slot));
        }
        let cascades = SHADOW_MAP_CASCADES as u32;

        graph.add_pass(
            PassNode::new("cull.main", PassKind::CullMain)
                .write(indirect_slot(0), Access::StorageWrite),
        )?;
        if config.shadows.cull_cascades {
            for i in 0..cascades {
                graph.add_pass(
                    PassNode::new(format!("cull.cascade{i}"), PassKind::CullCascade(i))
                        .write(indirect_slot(i as usize + 1), Access::StorageWrite),
                )?;
            }
        }

        graph.add_pass(
            PassNode::new("depth_prepass", PassKind::DepthPrepass)
                .read(indirect_slot(0), Access::Indirect)
                .write(DEPTH, Access::DepthAttachment)
                .write(NORMALS, Access::ColorAttachment),
        )?;

        let mut ssao = PassNode::new("ssao", PassKind::Ssao);
        if config.ssao.enabled {
            ssao = ssao
                .read(DEPTH, Access::Sampled)
                .read(NORMALS, Access::Sampled);
        }
        graph.add_pass(ssao.write(SSAO, Access::ColorAttachment))?;

        for i in 0..cascades {
            graph.add_pass(
                PassNode::new(format!("shadow.cascade{i}"), PassKind::Shadow(i))
                    .read(indirect_slot(i as usize + 1), Access::Indirect)
                    .write(shadow_layer(i), Access::DepthAttachment),
            )?;
        }

        let mut forward = PassNode::new("forward", PassKind::Forward)
            .read(indirect_slot(0), Access::Indirect)
            .read(DEPTH, Access::DepthAttachment)
            .read(SSAO, Access::Sampled);
        for i in 0..cascades {
            forward = forward.read(shadow_layer(i), Access::Sampled);
        }
        graph.add_pass(forward.write(HDR, Access::ColorAttachment))?;

        if config.bloom.enabled {
            for step in bloom_steps(bloom_mips.clamp(1, BLOOM_MIP_COUNT)) {
                let pass = match step {
                    BloomStep::Collect => PassNode::new("bloom.collect", PassKind::Bloom(step))
                        .read(HDR, Access::Sampled)
                        .write(bloom_mip(0), Access::ColorAttachment),
                    BloomStep::Downsample { src, dst } => {
                        PassNode::new(format!("bloom.down{dst}"), PassKind::Bloom(step))
                            .read(bloom_mip(src), Access::Sampled)
                            .write(bloom_mip(dst), Access::ColorAttachment)
                    }
                    BloomStep::Upsample { src, dst } => {
                        PassNode::new(format!("bloom.up{dst}"), PassKind::Bloom(step))
                            .read(bloom_mip(src), Access::Sampled)
                            .write(bloom_mip(dst), Access::ColorAttachment)
                    }
                };
                graph.add_pass(pass)?;
            }
        }

        let mut composite = PassNode::new("composite", PassKind::Composite).read(HDR, Access::Sampled);
        if config.bloom.enabled {
            composite = composite.read(bloom_mip(0), Access::Sampled);
        }
        graph.add_pass(composite.write(SURFACE, Access::ColorAttachment))?;
        graph.add_pass(
            PassNode::new("overlay", PassKind::Overlay).write(SURFACE, Access::ColorAttachment),
        )?;
        graph.add_pass(PassNode::new("present", PassKind::Present).read(SURFACE, Access::Present))?;
        Ok(graph)
    }
}

/// Validated passes plus the transitions needed between them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FramePlan {
    passes: Vec<PassNode>,
    transitions: Vec<Transition>,
}

impl FramePlan {
    pub fn passes(&self) -> &[PassNode] {
        &self.passes
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Transitions that must happen before pass `index` runs.
    pub fn transitions_for(&self, index: usize) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.pass == index)
    }

    pub fn position(&self, kind: PassKind) -> Option<usize> {
        self.passes.iter().position(|p| p.kind == kind)
    }

    pub fn passes_on(&self, queue: Queue) -> impl Iterator<Item = &PassNode> {
        self.passes.iter().filter(move |p| p.kind.queue() == queue)
    }

    pub fn log_transitions(&self) {
        for t in &self.transitions {
            tracing::trace!(
                pass = %self.passes[t.pass].name,
                resource = %t.resource,
                from = ?t.from,
                to = ?t.to,
                "frame transition"
            );
        }
    }
}

impl fmt::Display for FramePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, pass) in self.passes.iter().enumerate() {
            writeln!(f, "{index:>2} {:<16} {:?}", pass.name, pass.kind.queue())?;
            for t in self.transitions_for(index) {
                let from = t.from.map_or("Undefined".to_string(), |a| format!("{a:?}"));
                writeln!(f, "     {:<16} {from} -> {:?}", t.resource, t.to)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_write_is_rejected() {
        let mut graph = FrameGraph::new();
        let err = graph
            .add_pass(PassNode::new("ssao", PassKind::Ssao).read("depth", Access::Sampled))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::ReadBeforeWrite {
                pass: "ssao".into(),
                resource: "depth".into()
            }
        );
        assert!(graph.passes().is_empty());
    }

    #[test]
    fn imported_resources_may_be_read_first() {
        let mut graph = FrameGraph::new();
        graph.import("indirect.slot1");
        graph
            .add_pass(
                PassNode::new("shadow.cascade0", PassKind::Shadow(0))
                    .read("indirect.slot1", Access::Indirect),
            )
            .unwrap();
    }

    #[test]
    fn duplicate_and_misordered_passes() {
        let mut graph = FrameGraph::new();
        graph
            .add_pass(PassNode::new("prepass", PassKind::DepthPrepass).write("depth", Access::DepthAttachment))
            .unwrap();
        assert_eq!(
            graph.add_pass(PassNode::new("prepass", PassKind::DepthPrepass)),
            Err(GraphError::DuplicatePass("prepass".into()))
        );
        assert_eq!(
            graph.add_pass(PassNode::new("cull", PassKind::CullMain)),
            Err(GraphError::ComputeAfterGraphics("cull".into()))
        );
    }

    #[test]
    fn one_transition_per_state_change() {
        let mut graph = FrameGraph::new();
        graph
            .add_pass(PassNode::new("a", PassKind::DepthPrepass).write("depth", Access::DepthAttachment))
            .unwrap();
        graph
            .add_pass(PassNode::new("b", PassKind::Ssao).read("depth", Access::Sampled))
            .unwrap();
        graph
            .add_pass(PassNode::new("c", PassKind::Composite).read("depth", Access::Sampled))
            .unwrap();
        graph
            .add_pass(PassNode::new("d", PassKind::Forward).read("depth", Access::DepthAttachment))
            .unwrap();
        let plan = graph.compile();
        let kinds: Vec<_> = plan.transitions().iter().map(|t| (t.pass, t.from, t.to)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, None, Access::DepthAttachment),
                (1, Some(Access::DepthAttachment), Access::Sampled),
                (3, Some(Access::Sampled), Access::DepthAttachment),
            ]
        );
    }

    #[test]
    fn standard_frame_order() {
        let plan = FrameGraph::standard(&RendererConfig::default()).unwrap().compile();
        let pos = |k| plan.position(k).unwrap();
        assert!(pos(PassKind::CullMain) < pos(PassKind::DepthPrepass));
        assert!(pos(PassKind::DepthPrepass) < pos(PassKind::Ssao));
        assert!(pos(PassKind::Ssao) < pos(PassKind::Shadow(0)));
        assert!(pos(PassKind::Shadow(3)) < pos(PassKind::Forward));
        assert!(pos(PassKind::Forward) < pos(PassKind::Bloom(BloomStep::Collect)));
        assert!(pos(PassKind::Bloom(BloomStep::Upsample { src: 1, dst: 0 })) < pos(PassKind::Composite));
        assert!(pos(PassKind::Composite) < pos(PassKind::Overlay));
        assert_eq!(plan.passes().last().map(|p| p.kind), Some(PassKind::Present));
        assert_eq!(plan.passes_on(Queue::Compute).count(), 1 + SHADOW_MAP_CASCADES);

        // Shadow layers go undefined -> depth attachment -> sampled.
        let layer0: Vec<_> = plan
            .transitions()
            .iter()
            .filter(|t| t.resource == resources::shadow_layer(0))
            .map(|t| (t.from, t.to))
            .collect();
        assert_eq!(
            layer0,
            vec![
                (None, Access::DepthAttachment),
                (Some(Access::DepthAttachment), Access::Sampled)
            ]
        );
    }

    #[test]
    fn disabling_cascade_culling_and_bloom_still_validates() {
        let mut config = RendererConfig::default();
        config.shadows.cull_cascades = false;
        config.bloom.enabled = false;
        config.ssao.enabled = false;
        let plan = FrameGraph::standard(&config).unwrap().compile();
        assert_eq!(plan.passes_on(Queue::Compute).count(), 1);
        assert!(plan.position(PassKind::Bloom(BloomStep::Collect)).is_none());
        assert!(plan.to_string().contains("composite"));
    }

    #[test]
    fn short_bloom_chain_still_feeds_composite() {
        let plan = FrameGraph::standard_with_bloom_mips(&RendererConfig::default(), 1)
            .unwrap()
            .compile();
        let bloom: Vec<_> = plan
            .passes()
            .iter()
            .filter(|p| matches!(p.kind, PassKind::Bloom(_)))
            .collect();
        assert_eq!(bloom.len(), 1);
        assert!(plan.position(PassKind::Bloom(BloomStep::Collect)).unwrap() < plan.position(PassKind::Composite).unwrap());

        let plan = FrameGraph::standard_with_bloom_mips(&RendererConfig::default(), 3)
            .unwrap()
            .compile();
        assert!(plan.position(PassKind::Bloom(BloomStep::Downsample { src: 1, dst: 2 })).is_some());
        assert!(plan.position(PassKind::Bloom(BloomStep::Downsample { src: 2, dst: 3 })).is_none());
    }
}
