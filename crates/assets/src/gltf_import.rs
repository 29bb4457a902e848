//! glTF 2.0 front-end producing a [`SourceScene`].

use std::path::Path;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use gltf::animation::util::ReadOutputs;
use prism_common::{Aabb, Transform};

use crate::AssetError;
use crate::animation::{ChannelPath, Interpolation};
use crate::material::AlphaMode;
use crate::source::{
    SourceAnimation, SourceChannel, SourceImage, SourceMaterial, SourceMesh, SourceNode,
    SourcePrimitive, SourceSampler, SourceScene, SourceSkin, Topology,
};

/// Decode a `.gltf`/`.glb` file and its buffers into a source scene.
///
/// Uses the default scene, or the first scene when none is marked default.
/// Morph-target channels are dropped. Images are converted to RGBA8 and
/// every material map is assumed to read `TEXCOORD_0`.
pub fn import_gltf(path: impl AsRef<Path>) -> Result<SourceScene, AssetError> {
    let path = path.as_ref();
    let _span = tracing::info_span!("import_gltf", path = %path.display()).entered();

    let (document, buffers, image_data) = gltf::import(path)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let roots = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .map(|scene| scene.nodes().map(|n| n.index()).collect())
        .unwrap_or_default();

    let nodes = document
        .nodes()
        .map(|node| {
            let (transform, matrix) = match node.transform() {
                gltf::scene::Transform::Matrix { matrix } => {
                    (Transform::IDENTITY, Mat4::from_cols_array_2d(&matrix))
                }
                gltf::scene::Transform::Decomposed {
                    translation,
                    rotation,
                    scale,
                } => (
                    Transform {
                        translation: Vec3::from(translation),
                        rotation: Quat::from_array(rotation),
                        scale: Vec3::from(scale),
                    },
                    Mat4::IDENTITY,
                ),
            };
            SourceNode {
                name: node.name().unwrap_or_default().to_string(),
                transform,
                matrix,
                mesh: node.mesh().map(|m| m.index()),
                skin: node.skin().map(|s| s.index()),
                children: node.children().map(|c| c.index()).collect(),
            }
        })
        .collect();

    let meshes = document
        .meshes()
        .map(|mesh| SourceMesh {
            name: mesh.name().unwrap_or_default().to_string(),
            primitives: mesh
                .primitives()
                .map(|primitive| read_primitive(&primitive, &buffers))
                .collect(),
        })
        .collect();

    let materials = document.materials().map(|m| read_material(&m)).collect();

    let images = document
        .images()
        .zip(&image_data)
        .map(|(image, data)| {
            let name = image.name().unwrap_or_default().to_string();
            let pixels = rgba8(data).unwrap_or_else(|| {
                tracing::warn!(image = image.index(), %name, "unreadable image layout; map dropped");
                Vec::new()
            });
            SourceImage {
                name,
                width: data.width,
                height: data.height,
                pixels,
            }
        })
        .collect();

    let skins = document
        .skins()
        .map(|skin| {
            let reader = skin.reader(|b| buffers.get(b.index()).map(|d| &d[..]));
            SourceSkin {
                name: skin.name().unwrap_or_default().to_string(),
                joints: skin.joints().map(|j| j.index()).collect(),
                inverse_bind_matrices: reader
                    .read_inverse_bind_matrices()
                    .map(|iter| iter.map(|m| Mat4::from_cols_array_2d(&m)).collect()),
            }
        })
        .collect();

    let animations = document
        .animations()
        .map(|animation| read_animation(&animation, &buffers))
        .collect();

    let scene = SourceScene {
        name,
        nodes,
        roots,
        meshes,
        materials,
        images,
        skins,
        animations,
    };
    tracing::info!(
        nodes = scene.nodes.len(),
        meshes = scene.meshes.len(),
        images = scene.images.len(),
        skins = scene.skins.len(),
        animations = scene.animations.len(),
        "glTF imported"
    );
    Ok(scene)
}

fn read_material(material: &gltf::Material<'_>) -> SourceMaterial {
    let pbr = material.pbr_metallic_roughness();
    let image = |texture: gltf::Texture<'_>| texture.source().index();
    SourceMaterial {
        name: material.name().unwrap_or_default().to_string(),
        base_color: Vec4::from(pbr.base_color_factor()),
        emissive: Vec3::from(material.emissive_factor()),
        emissive_strength: material.emissive_strength().unwrap_or(1.0),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        normal_scale: material.normal_texture().map_or(1.0, |n| n.scale()),
        alpha_mode: match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        },
        alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
        double_sided: material.double_sided(),
        base_color_texture: pbr.base_color_texture().map(|t| image(t.texture())),
        metallic_roughness_texture: pbr.metallic_roughness_texture().map(|t| image(t.texture())),
        normal_texture: material.normal_texture().map(|t| image(t.texture())),
        emissive_texture: material.emissive_texture().map(|t| image(t.texture())),
        occlusion_texture: material.occlusion_texture().map(|t| image(t.texture())),
    }
}

/// Expand a decoded glTF image to RGBA8. Grey images replicate into RGB;
/// 16-bit and float channels are narrowed.
fn rgba8(data: &gltf::image::Data) -> Option<Vec<u8>> {
    use gltf::image::Format;

    let (channels, bytes) = match data.format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => (4, 1),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        Format::R32G32B32FLOAT => (3, 4),
        Format::R32G32B32A32FLOAT => (4, 4),
    };
    let texels = data.width as usize * data.height as usize;
    let stride = channels * bytes;
    if data.pixels.len() != texels * stride {
        return None;
    }

    let channel = |raw: &[u8]| -> u8 {
        match raw {
            [v] => *v,
            [lo, hi] => (u16::from_ne_bytes([*lo, *hi]) >> 8) as u8,
            [a, b, c, d] => (f32::from_ne_bytes([*a, *b, *c, *d]).clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
            _ => 0,
        }
    };
    let mut out = Vec::with_capacity(texels * 4);
    for texel in data.pixels.chunks_exact(stride) {
        let mut c = [0u8; 4];
        for (slot, raw) in c.iter_mut().zip(texel.chunks_exact(bytes)) {
            *slot = channel(raw);
        }
        let rgba = match channels {
            1 => [c[0], c[0], c[0], 255],
            2 => [c[0], c[0], c[0], c[1]],
            3 => [c[0], c[1], c[2], 255],
            _ => c,
        };
        out.extend_from_slice(&rgba);
    }
    Some(out)
}

fn topology(mode: gltf::mesh::Mode) -> Topology {
    use gltf::mesh::Mode;
    match mode {
        Mode::Points => Topology::PointList,
        Mode::Lines => Topology::LineList,
        Mode::LineLoop => Topology::LineLoop,
        Mode::LineStrip => Topology::LineStrip,
        Mode::Triangles => Topology::TriangleList,
        Mode::TriangleStrip => Topology::TriangleStrip,
        Mode::TriangleFan => Topology::TriangleFan,
    }
}

fn read_primitive(primitive: &gltf::Primitive<'_>, buffers: &[gltf::buffer::Data]) -> SourcePrimitive {
    let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| &d[..]));
    let positions: Vec<Vec3> = reader
        .read_positions()
        .map(|iter| iter.map(Vec3::from).collect())
        .unwrap_or_default();
    let bb = primitive.bounding_box();

    SourcePrimitive {
        topology: topology(primitive.mode()),
        normals: reader
            .read_normals()
            .map(|iter| iter.map(Vec3::from).collect()),
        uvs: reader
            .read_tex_coords(0)
            .map(|tc| tc.into_f32().map(Vec2::from).collect()),
        tangents: reader
            .read_tangents()
            .map(|iter| iter.map(Vec4::from).collect()),
        joints: reader.read_joints(0).map(|j| j.into_u16().collect()),
        weights: reader
            .read_weights(0)
            .map(|w| w.into_f32().map(Vec4::from).collect()),
        indices: reader.read_indices().map(|i| i.into_u32().collect()),
        material: primitive.material().index(),
        bounds: Some(Aabb::new(Vec3::from(bb.min), Vec3::from(bb.max))),
        positions,
    }
}

fn read_animation(animation: &gltf::Animation<'_>, buffers: &[gltf::buffer::Data]) -> SourceAnimation {
    let mut samplers = Vec::new();
    let mut channels = Vec::new();

    for channel in animation.channels() {
        let path = match channel.target().property() {
            gltf::animation::Property::Translation => ChannelPath::Translation,
            gltf::animation::Property::Rotation => ChannelPath::Rotation,
            gltf::animation::Property::Scale => ChannelPath::Scale,
            gltf::animation::Property::MorphTargetWeights => {
                tracing::debug!(animation = ?animation.name(), "skipping morph-target channel");
                continue;
            }
        };
        let interpolation = match channel.sampler().interpolation() {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        };

        let reader = channel.reader(|b| buffers.get(b.index()).map(|d| &d[..]));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let outputs: Vec<Vec4> = match reader.read_outputs() {
            Some(ReadOutputs::Translations(iter)) | Some(ReadOutputs::Scales(iter)) => {
                iter.map(|v| Vec3::from(v).extend(0.0)).collect()
            }
            Some(ReadOutputs::Rotations(rotations)) => {
                rotations.into_f32().map(Vec4::from).collect()
            }
            _ => continue,
        };

        channels.push(SourceChannel {
            node: channel.target().node().index(),
            path,
            sampler: samplers.len(),
        });
        samplers.push(SourceSampler {
            interpolation,
            inputs: inputs.collect(),
            outputs,
        });
    }

    SourceAnimation {
        name: animation.name().unwrap_or_default().to_string(),
        samplers,
        channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// One triangle, positions + indices in a base64 data URI buffer.
    fn triangle_gltf() -> String {
        let mut bytes = Vec::new();
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in [0u16, 1, 2] {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        let encoded = base64_encode(&bytes);
        format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "name": "tri", "mesh": 0, "translation": [1.0, 2.0, 3.0] }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "indices": 1 }}] }}],
  "buffers": [{{ "byteLength": {len}, "uri": "data:application/octet-stream;base64,{encoded}" }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#,
            len = bytes.len()
        )
    }

    fn base64_encode(data: &[u8]) -> String {
        const TABLE: &[u8; 64] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut out = String::new();
        for chunk in data.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32;
            for i in 0..4 {
                if i <= chunk.len() {
                    out.push(TABLE[((n >> (18 - 6 * i)) & 63) as usize] as char);
                } else {
                    out.push('=');
                }
            }
        }
        out
    }

    #[test]
    fn imports_single_triangle() {
        let mut file = tempfile::Builder::new().suffix(".gltf").tempfile().unwrap();
        file.write_all(triangle_gltf().as_bytes()).unwrap();

        let scene = import_gltf(file.path()).unwrap();
        assert_eq!(scene.roots, vec![0]);
        assert_eq!(scene.nodes[0].transform.translation, Vec3::new(1.0, 2.0, 3.0));
        let prim = &scene.meshes[0].primitives[0];
        assert_eq!(prim.topology, Topology::TriangleList);
        assert_eq!(prim.positions.len(), 3);
        assert_eq!(prim.indices.as_deref(), Some(&[0, 1, 2][..]));
        assert_eq!(prim.material, None);
        assert!(!scene.is_skinned());
    }

    /// A quad whose material samples an embedded 2x2 PNG.
    fn textured_gltf() -> String {
        let mut bytes = Vec::new();
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        for uv in [[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]] {
            for c in uv {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        let mut png = std::io::Cursor::new(Vec::new());
        image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "extensionsUsed": ["KHR_materials_emissive_strength"],
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "mesh": 0 }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0, "TEXCOORD_0": 1 }}, "material": 0 }}] }}],
  "materials": [{{
    "name": "painted",
    "pbrMetallicRoughness": {{ "baseColorTexture": {{ "index": 0 }}, "metallicFactor": 0.0 }},
    "emissiveFactor": [1.0, 0.5, 0.25],
    "extensions": {{ "KHR_materials_emissive_strength": {{ "emissiveStrength": 3.0 }} }},
    "alphaMode": "MASK",
    "alphaCutoff": 0.25,
    "doubleSided": true
  }}],
  "textures": [{{ "source": 0 }}],
  "images": [{{ "name": "paint", "uri": "data:image/png;base64,{png}" }}],
  "buffers": [{{ "byteLength": {len}, "uri": "data:application/octet-stream;base64,{encoded}" }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 24 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC2" }}
  ]
}}"#,
            png = base64_encode(png.get_ref()),
            encoded = base64_encode(&bytes),
            len = bytes.len()
        )
    }

    #[test]
    fn imports_material_maps_and_images() {
        let mut file = tempfile::Builder::new().suffix(".gltf").tempfile().unwrap();
        file.write_all(textured_gltf().as_bytes()).unwrap();

        let scene = import_gltf(file.path()).unwrap();
        let material = &scene.materials[0];
        assert_eq!(material.name, "painted");
        assert_eq!(material.base_color_texture, Some(0));
        assert_eq!(material.normal_texture, None);
        assert_eq!(material.emissive_strength, 3.0);
        assert_eq!(material.alpha_mode, AlphaMode::Mask);
        assert_eq!(material.alpha_cutoff, 0.25);
        assert!(material.double_sided);

        let image = &scene.images[0];
        assert_eq!(image.name, "paint");
        assert!(image.is_valid());
        assert_eq!(&image.pixels[..4], &[10, 20, 30, 255]);
        assert!(scene.meshes[0].primitives[0].uvs.is_some());
    }

    #[test]
    fn narrow_formats_expand_to_rgba() {
        let grey_alpha = gltf::image::Data {
            pixels: vec![100, 7],
            format: gltf::image::Format::R8G8,
            width: 1,
            height: 1,
        };
        assert_eq!(rgba8(&grey_alpha), Some(vec![100, 100, 100, 7]));

        let wide = gltf::image::Data {
            pixels: [0xffffu16, 0x8000, 0, 0xffff].iter().flat_map(|v| v.to_ne_bytes()).collect(),
            format: gltf::image::Format::R16G16B16A16,
            width: 1,
            height: 1,
        };
        assert_eq!(rgba8(&wide), Some(vec![255, 128, 0, 255]));

        let short = gltf::image::Data {
            pixels: vec![1, 2, 3],
            format: gltf::image::Format::R8G8B8A8,
            width: 1,
            height: 1,
        };
        assert_eq!(rgba8(&short), None);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = import_gltf(dir.path().join("absent.gltf"));
        assert!(result.is_err());
    }
}
