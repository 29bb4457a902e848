//! Size-dependent render targets. All of them are recreated together when
//! the surface changes size.

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const SSAO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const BLOOM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

pub(crate) fn create_target(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    size: (u32, u32),
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.0.max(1),
            height: size.1.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&Default::default());
    (texture, view)
}

pub struct FrameTargets {
    size: (u32, u32),
    pub depth: wgpu::TextureView,
    pub normals: wgpu::TextureView,
    pub ssao: wgpu::TextureView,
    pub hdr: wgpu::TextureView,
    /// Prepass depth and normals for the SSAO pass.
    pub gbuffer_group: wgpu::BindGroup,
}

impl FrameTargets {
    pub fn new(device: &wgpu::Device, gbuffer_layout: &wgpu::BindGroupLayout, size: (u32, u32)) -> Self {
        let (_, depth) = create_target(device, "depth_target", DEPTH_FORMAT, size);
        let (_, normals) = create_target(device, "normal_target", NORMAL_FORMAT, size);
        let (_, ssao) = create_target(device, "ssao_target", SSAO_FORMAT, size);
        let (_, hdr) = create_target(device, "hdr_target", HDR_FORMAT, size);

        let gbuffer_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer_group"),
            layout: gbuffer_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&depth),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&normals),
                },
            ],
        });

        tracing::debug!(width = size.0, height = size.1, "frame targets created");
        Self {
            size,
            depth,
            normals,
            ssao,
            hdr,
            gbuffer_group,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}
