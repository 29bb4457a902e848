//! Image-based lighting maps: a diffuse irradiance cube, a prefiltered
//! specular cube and the split-sum BRDF lookup table.
//!
//! The set is loaded from one directory holding `diffuse.ktx2`,
//! `specular.ktx2` and `lut.png`. A directory missing any of them is not an
//! error; the renderer simply keeps its analytic sky ambient.
//!
//! # Invariants
//! - Cube data is mip-major: all six faces of mip 0, then mip 1, and so on.
//! - Every level holds exactly `edge * edge * 6` texels of `format`.

use std::path::Path;

use serde::Serialize;

use crate::AssetError;

pub const DIFFUSE_FILE: &str = "diffuse.ktx2";
pub const SPECULAR_FILE: &str = "specular.ktx2";
pub const LUT_FILE: &str = "lut.png";

/// Texel formats accepted in cube map containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CubeFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Rgb9e5Ufloat,
}

impl CubeFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Rgb9e5Ufloat => 4,
            Self::Rgba16Float => 8,
        }
    }

    fn from_ktx2(format: ktx2::Format) -> Option<Self> {
        match format {
            ktx2::Format::R8G8B8A8_UNORM => Some(Self::Rgba8Unorm),
            ktx2::Format::R8G8B8A8_SRGB => Some(Self::Rgba8UnormSrgb),
            ktx2::Format::R16G16B16A16_SFLOAT => Some(Self::Rgba16Float),
            ktx2::Format::E5B9G9R9_UFLOAT_PACK32 => Some(Self::Rgb9e5Ufloat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CubeMap {
    /// Face edge length of mip 0.
    pub size: u32,
    pub mip_count: u32,
    pub format: CubeFormat,
    pub data: Vec<u8>,
}

impl CubeMap {
    /// Decode a KTX2 cube map, undoing Zstandard supercompression.
    pub fn from_ktx2(bytes: &[u8]) -> Result<Self, AssetError> {
        let reader = ktx2::Reader::new(bytes).map_err(|e| AssetError::Ktx2(format!("{e:?}")))?;
        let header = reader.header();
        let invalid = |reason: String| AssetError::Ktx2(reason);

        if header.face_count != 6 {
            return Err(invalid(format!("{} faces, a cube map needs 6", header.face_count)));
        }
        if header.pixel_width != header.pixel_height || header.pixel_depth > 1 || header.layer_count > 1 {
            return Err(invalid(format!(
                "{}x{}x{} with {} layers is not a single square cube",
                header.pixel_width, header.pixel_height, header.pixel_depth, header.layer_count
            )));
        }
        let format = header
            .format
            .and_then(CubeFormat::from_ktx2)
            .ok_or_else(|| invalid(format!("unsupported format {:?}", header.format)))?;
        let zstd = match header.supercompression_scheme {
            None => false,
            Some(ktx2::SupercompressionScheme::Zstandard) => true,
            Some(other) => return Err(invalid(format!("unsupported supercompression {other:?}"))),
        };

        let size = header.pixel_width;
        let mip_count = header.level_count.max(1);
        if mip_count > u32::BITS - size.leading_zeros() {
            return Err(invalid(format!("{mip_count} levels is too many for a {size} cube")));
        }

        let mut data = Vec::new();
        for (level, raw) in reader.levels().enumerate() {
            let expected = cube_level_bytes(size, level as u32, format);
            let decoded = if zstd {
                zstd::decode_all(raw).map_err(|e| invalid(format!("level {level}: {e}")))?
            } else {
                raw.to_vec()
            };
            if decoded.len() != expected {
                return Err(invalid(format!(
                    "level {level} holds {} bytes, expected {expected}",
                    decoded.len()
                )));
            }
            data.extend_from_slice(&decoded);
        }

        Ok(Self {
            size,
            mip_count,
            format,
            data,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Self::from_ktx2(&bytes).map_err(|e| AssetError::Environment {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Bytes of all six faces of mip `level`.
pub fn cube_level_bytes(size: u32, level: u32, format: CubeFormat) -> usize {
    let edge = (size >> level).max(1) as usize;
    edge * edge * 6 * format.bytes_per_texel()
}

/// Split-sum BRDF table: x = NdotV, y = roughness; RGBA8.
#[derive(Debug, Clone)]
pub struct LookupTable {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl LookupTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let image = image::open(path)?.to_rgba8();
        Ok(Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentMaps {
    pub diffuse: CubeMap,
    pub specular: CubeMap,
    pub lut: LookupTable,
}

impl EnvironmentMaps {
    /// Load the three maps from `dir`. `Ok(None)` when any file is absent.
    pub fn load(dir: impl AsRef<Path>) -> Result<Option<Self>, AssetError> {
        let dir = dir.as_ref();
        let _span = tracing::info_span!("environment_load", dir = %dir.display()).entered();

        let paths = [dir.join(DIFFUSE_FILE), dir.join(SPECULAR_FILE), dir.join(LUT_FILE)];
        if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
            tracing::info!(missing = %missing.display(), "environment maps incomplete; skipping");
            return Ok(None);
        }
        let [diffuse, specular, lut] = paths;

        let maps = Self {
            diffuse: CubeMap::load(diffuse)?,
            specular: CubeMap::load(specular)?,
            lut: LookupTable::load(lut)?,
        };
        tracing::info!(
            diffuse = maps.diffuse.size,
            specular = maps.specular.size,
            specular_mips = maps.specular.mip_count,
            "environment maps loaded"
        );
        Ok(Some(maps))
    }
}
