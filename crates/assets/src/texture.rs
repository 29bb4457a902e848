//! Material images packed into one square RGBA8 array texture per asset.
//!
//! Layer 0 is always opaque white so a material without a map still has a
//! valid layer to point at. Every other layer holds one scene image, scaled
//! to the array size, with a full box-filtered mip chain.

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::source::SourceImage;

/// Largest layer edge; bigger images are scaled down.
pub const MAX_TEXTURE_SIZE: u32 = 1024;
/// Default `max_texture_array_layers` of wgpu.
pub const MAX_TEXTURE_LAYERS: u32 = 256;

#[derive(Debug, Clone)]
pub struct TextureArray {
    size: u32,
    mip_count: u32,
    layer_count: u32,
    /// Every mip of layer 0, then every mip of layer 1, and so on.
    data: Vec<u8>,
    image_layers: Vec<Option<u32>>,
}

impl TextureArray {
    pub const WHITE_LAYER: u32 = 0;

    pub fn from_images(images: &[SourceImage]) -> Self {
        let _span = tracing::debug_span!("texture_array", images = images.len()).entered();
        let size = images
            .iter()
            .filter(|i| i.is_valid())
            .map(|i| i.width.max(i.height))
            .max()
            .unwrap_or(1)
            .next_power_of_two()
            .min(MAX_TEXTURE_SIZE);
        let mip_count = u32::BITS - size.leading_zeros();

        let mut data = vec![255u8; layer_bytes(size, mip_count)];
        let mut layer_count = 1;
        let mut image_layers = Vec::with_capacity(images.len());
        for (index, source) in images.iter().enumerate() {
            if layer_count >= MAX_TEXTURE_LAYERS {
                tracing::warn!(image = index, name = %source.name, "texture array is full; map ignored");
                image_layers.push(None);
                continue;
            }
            let Some(base) = to_rgba(source) else {
                tracing::warn!(image = index, name = %source.name, "image has a bad pixel buffer; map ignored");
                image_layers.push(None);
                continue;
            };
            push_mip_chain(&mut data, base, size, mip_count);
            image_layers.push(Some(layer_count));
            layer_count += 1;
        }

        tracing::debug!(size, mip_count, layer_count, "texture array packed");
        Self {
            size,
            mip_count,
            layer_count,
            data,
            image_layers,
        }
    }

    /// Edge length of mip 0.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Array layer holding scene image `image`.
    pub fn layer(&self, image: Option<usize>) -> Option<u32> {
        image.and_then(|i| self.image_layers.get(i).copied().flatten())
    }
}

fn layer_bytes(size: u32, mip_count: u32) -> usize {
    (0..mip_count)
        .map(|level| {
            let edge = (size >> level).max(1) as usize;
            edge * edge * 4
        })
        .sum()
}

fn to_rgba(source: &SourceImage) -> Option<RgbaImage> {
    if !source.is_valid() {
        return None;
    }
    RgbaImage::from_raw(source.width, source.height, source.pixels.clone())
}

fn push_mip_chain(data: &mut Vec<u8>, base: RgbaImage, size: u32, mip_count: u32) {
    let mut level = if base.dimensions() == (size, size) {
        base
    } else {
        imageops::resize(&base, size, size, FilterType::Triangle)
    };
    data.extend_from_slice(level.as_raw());
    for mip in 1..mip_count {
        let edge = (size >> mip).max(1);
        level = imageops::resize(&level, edge, edge, FilterType::Triangle);
        data.extend_from_slice(level.as_raw());
    }
}
