//! Bloom mip chain: sizes, pass order, and a CPU model of the energy flow.

use prism_common::limits::BLOOM_MIP_COUNT;
use serde::{Deserialize, Serialize};

/// Bloom tuning. `knee` softens the threshold transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    pub threshold: f32,
    pub knee: f32,
    pub intensity: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.0,
            knee: 0.5,
            intensity: 0.04,
        }
    }
}

impl BloomSettings {
    /// Fraction of a colour with peak channel `brightness` that passes the
    /// soft threshold. The collect shader uses the same curve.
    pub fn soft_threshold(&self, brightness: f32) -> f32 {
        let knee = self.knee.max(0.0);
        let soft = (brightness - self.threshold + knee).clamp(0.0, 2.0 * knee);
        let soft = soft * soft / (4.0 * knee + 1e-4);
        let contribution = soft.max(brightness - self.threshold);
        contribution.max(0.0) / brightness.max(1e-4)
    }
}

/// One step of the bloom sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BloomStep {
    /// Threshold the HDR target into mip 0.
    Collect,
    /// Filter mip `src` into the next-smaller mip `dst`.
    Downsample { src: u32, dst: u32 },
    /// Tent-filter mip `src` and add it into the larger mip `dst`.
    Upsample { src: u32, dst: u32 },
}

/// Mip sizes of the bloom texture for a given surface size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BloomChain {
    sizes: Vec<(u32, u32)>,
}

impl BloomChain {
    /// Mip 0 is half the surface size; each level halves again. Small
    /// surfaces get fewer levels, so no level is smaller than one texel in
    /// its largest dimension.
    pub fn new(width: u32, height: u32) -> Self {
        let mut size = ((width / 2).max(1), (height / 2).max(1));
        let levels = BLOOM_MIP_COUNT.min(max_mip_levels(size.0, size.1));
        let sizes = (0..levels)
            .map(|_| {
                let current = size;
                size = ((size.0 / 2).max(1), (size.1 / 2).max(1));
                current
            })
            .collect();
        Self { sizes }
    }

    pub fn mip_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    pub fn size(&self, mip: u32) -> Option<(u32, u32)> {
        self.sizes.get(mip as usize).copied()
    }

    pub fn sizes(&self) -> &[(u32, u32)] {
        &self.sizes
    }

    /// Collect, downsample 0→1..3→4, then upsample 4→3..1→0.
    pub fn steps(&self) -> Vec<BloomStep> {
        bloom_steps(self.mip_count())
    }
}

/// Length of a full mip chain for a `width` x `height` texture.
pub fn max_mip_levels(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

pub fn bloom_steps(mip_count: u32) -> Vec<BloomStep> {
    if mip_count == 0 {
        return Vec::new();
    }
    let last = mip_count - 1;
    let mut steps = vec![BloomStep::Collect];
    steps.extend((0..last).map(|src| BloomStep::Downsample { src, dst: src + 1 }));
    steps.extend((1..=last).rev().map(|src| BloomStep::Upsample { src, dst: src - 1 }));
    steps
}

/// Per-level values of a uniform-colour CPU run of the bloom chain.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomSimulation {
    /// Value of each mip after downsampling, before any upsample.
    pub levels: Vec<f32>,
    /// Mip 0 after every upsample has been added in.
    pub final_mip0: f32,
}

/// Run the chain on a constant-brightness source. Box and tent filters of a
/// constant image return the constant, so each level carries the collected
/// value and upsampling accumulates it.
pub fn simulate(settings: &BloomSettings, brightness: f32, mip_count: u32) -> BloomSimulation {
    let collected = brightness * settings.soft_threshold(brightness);
    let mut mips = vec![0.0f32; mip_count as usize];
    let mut levels = None;
    for step in bloom_steps(mip_count) {
        match step {
            BloomStep::Collect => mips[0] = collected,
            BloomStep::Downsample { src, dst } => mips[dst as usize] = mips[src as usize],
            BloomStep::Upsample { src, dst } => {
                levels.get_or_insert_with(|| mips.clone());
                mips[dst as usize] += mips[src as usize];
            }
        }
    }
    BloomSimulation {
        levels: levels.unwrap_or_else(|| mips.clone()),
        final_mip0: mips.first().copied().unwrap_or(0.0),
    }
}
