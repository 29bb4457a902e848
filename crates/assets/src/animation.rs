//! Keyframe animation clips driving node transforms.

use glam::{Quat, Vec4};
use serde::{Deserialize, Serialize};

use crate::node::{NodeArena, NodeId};
use crate::source::SourceAnimation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelPath {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Step,
    Linear,
    /// Outputs are `[in_tangent, value, out_tangent]` triplets per key.
    CubicSpline,
}

#[derive(Debug, Clone)]
pub struct Sampler {
    pub interpolation: Interpolation,
    pub inputs: Vec<f32>,
    pub outputs: Vec<Vec4>,
}

impl Sampler {
    fn value(&self, key: usize) -> Vec4 {
        match self.interpolation {
            Interpolation::CubicSpline => self.outputs[key * 3 + 1],
            _ => self.outputs[key],
        }
    }

    fn well_formed(&self) -> bool {
        let per_key = match self.interpolation {
            Interpolation::CubicSpline => 3,
            _ => 1,
        };
        !self.inputs.is_empty() && self.outputs.len() >= self.inputs.len() * per_key
    }

    /// Sample at `time`, clamping outside the key range.
    pub fn sample(&self, time: f32, path: ChannelPath) -> Option<Vec4> {
        if !self.well_formed() {
            return None;
        }
        let last = self.inputs.len() - 1;
        if time <= self.inputs[0] {
            return Some(self.value(0));
        }
        if time >= self.inputs[last] {
            return Some(self.value(last));
        }

        // First key strictly after `time`; the interval is [i, i + 1].
        let i = self.inputs.partition_point(|&t| t <= time) - 1;
        let (t0, t1) = (self.inputs[i], self.inputs[i + 1]);
        let span = t1 - t0;
        let a = if span > 0.0 { (time - t0) / span } else { 0.0 };

        let value = match self.interpolation {
            Interpolation::Step => self.value(i),
            Interpolation::Linear => {
                let (v0, v1) = (self.value(i), self.value(i + 1));
                match path {
                    ChannelPath::Rotation => Vec4::from(
                        Quat::from_vec4(v0)
                            .normalize()
                            .slerp(Quat::from_vec4(v1).normalize(), a),
                    ),
                    _ => v0.lerp(v1, a),
                }
            }
            Interpolation::CubicSpline => {
                let p0 = self.outputs[i * 3 + 1];
                let m0 = self.outputs[i * 3 + 2] * span;
                let p1 = self.outputs[(i + 1) * 3 + 1];
                let m1 = self.outputs[(i + 1) * 3] * span;
                let (a2, a3) = (a * a, a * a * a);
                let v = p0 * (2.0 * a3 - 3.0 * a2 + 1.0)
                    + m0 * (a3 - 2.0 * a2 + a)
                    + p1 * (-2.0 * a3 + 3.0 * a2)
                    + m1 * (a3 - a2);
                match path {
                    ChannelPath::Rotation => v.normalize_or_zero(),
                    _ => v,
                }
            }
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Channel {
    pub target: NodeId,
    pub path: ChannelPath,
    pub sampler: usize,
}

/// A clip with its own play clock. `start`/`end` span every sampler's keys.
#[derive(Debug, Clone)]
pub struct Animation {
    pub name: String,
    samplers: Vec<Sampler>,
    channels: Vec<Channel>,
    start: f32,
    end: f32,
    current: f32,
}

impl Animation {
    pub fn new(name: impl Into<String>, samplers: Vec<Sampler>, channels: Vec<Channel>) -> Self {
        let (start, end) = samplers
            .iter()
            .flat_map(|s| s.inputs.iter().copied())
            .fold(None, |acc: Option<(f32, f32)>, t| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
            .unwrap_or((0.0, 0.0));
        Self {
            name: name.into(),
            samplers,
            channels,
            start,
            end,
            current: start,
        }
    }

    pub fn from_source(src: &SourceAnimation, node_count: usize) -> Self {
        let samplers = src
            .samplers
            .iter()
            .map(|s| Sampler {
                interpolation: s.interpolation,
                inputs: s.inputs.clone(),
                outputs: s.outputs.clone(),
            })
            .collect();
        let channels = src
            .channels
            .iter()
            .filter(|c| c.node < node_count && c.sampler < src.samplers.len())
            .map(|c| Channel {
                target: NodeId(c.node as u32),
                path: c.path,
                sampler: c.sampler,
            })
            .collect();
        Self::new(src.name.clone(), samplers, channels)
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn end(&self) -> f32 {
        self.end
    }

    pub fn current_time(&self) -> f32 {
        self.current
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn set_time(&mut self, time: f32) {
        self.current = time;
        self.wrap();
    }

    /// Advance the clock, wrapping past `end` back by whole clip lengths.
    pub fn advance(&mut self, dt: f32) {
        self.current += dt;
        self.wrap();
    }

    fn wrap(&mut self) {
        let length = self.end - self.start;
        if length <= 0.0 {
            self.current = self.start;
            return;
        }
        while self.current > self.end {
            self.current -= length;
        }
    }

    /// Write every channel's sampled value at the current time.
    pub fn apply(&self, nodes: &mut NodeArena) {
        for channel in &self.channels {
            let Some(value) = self.samplers[channel.sampler].sample(self.current, channel.path)
            else {
                continue;
            };
            match channel.path {
                ChannelPath::Translation => nodes.set_translation(channel.target, value.truncate()),
                ChannelPath::Rotation => {
                    nodes.set_rotation(channel.target, Quat::from_vec4(value).normalize())
                }
                ChannelPath::Scale => nodes.set_scale(channel.target, value.truncate()),
            }
        }
    }
}

/// The clip set of one skinned asset with at most one active clip.
#[derive(Debug, Clone, Default)]
pub struct AnimationPlayer {
    animations: Vec<Animation>,
    active: Option<usize>,
    paused: bool,
}

impl AnimationPlayer {
    /// The first clip, if any, starts active.
    pub fn new(animations: Vec<Animation>) -> Self {
        let active = if animations.is_empty() { None } else { Some(0) };
        Self {
            animations,
            active,
            paused: false,
        }
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn active(&self) -> Option<&Animation> {
        self.active.and_then(|i| self.animations.get(i))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.animations.iter().position(|a| a.name == name)
    }

    pub fn set_active(&mut self, index: Option<usize>) {
        self.active = index.filter(|&i| i < self.animations.len());
    }

    /// Returns false when no clip has that name; the active clip is unchanged.
    pub fn set_active_by_name(&mut self, name: &str) -> bool {
        match self.index_of(name) {
            Some(i) => {
                self.active = Some(i);
                true
            }
            None => false,
        }
    }

    /// Step to the following clip, wrapping around. Starts at the first clip
    /// when none is active.
    pub fn cycle(&mut self) -> Option<usize> {
        if self.animations.is_empty() {
            return None;
        }
        let next = self.active.map_or(0, |i| (i + 1) % self.animations.len());
        self.active = Some(next);
        self.active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Advance the active clip (unless paused) and pose the nodes. Returns
    /// whether a clip was applied.
    pub fn update(&mut self, dt: f32, nodes: &mut NodeArena) -> bool {
        let Some(animation) = self.active.and_then(|i| self.animations.get_mut(i)) else {
            return false;
        };
        if !self.paused {
            animation.advance(dt);
        }
        animation.apply(nodes);
        true
    }
}
