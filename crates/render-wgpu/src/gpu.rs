use crate::error::RenderError;

/// Features the renderer cannot run without. Culling writes per-draw
/// instance counts and the vertex stage indexes metadata with
/// `instance_index`, so `first_instance` must be honoured by indirect draws.
pub const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::INDIRECT_FIRST_INSTANCE;

/// Used when the adapter has it; otherwise draws are issued one by one.
pub const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::MULTI_DRAW_INDIRECT;

/// Device, queue and the configured presentation surface.
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub adapter_info: wgpu::AdapterInfo,
    multi_draw: bool,
    last_submission: Option<wgpu::SubmissionIndex>,
}

impl GpuContext {
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        size: (u32, u32),
        vsync: bool,
    ) -> Result<Self, RenderError> {
        let _span = tracing::info_span!("gpu_init").entered();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(target)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(RenderError::NoAdapter)?;
        let adapter_info = adapter.get_info();

        let available = adapter.features();
        if !available.contains(REQUIRED_FEATURES) {
            return Err(RenderError::UnsupportedFeatures {
                adapter: adapter_info.name.clone(),
                missing: REQUIRED_FEATURES - available,
            });
        }
        let optional = available & OPTIONAL_FEATURES;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("prism_device"),
                required_features: REQUIRED_FEATURES | optional,
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        ))?;
        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!("uncaptured GPU error: {error}");
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or(RenderError::NoSurfaceFormat)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.0.max(1),
            height: size.1.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        tracing::info!(
            adapter = %adapter_info.name,
            backend = adapter_info.backend.to_str(),
            ?format,
            multi_draw = !optional.is_empty(),
            "GPU initialized"
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            adapter_info,
            multi_draw: !optional.is_empty(),
            last_submission: None,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn supports_multi_draw(&self) -> bool {
        self.multi_draw
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        tracing::debug!(width = self.config.width, height = self.config.height, "surface reconfigured");
    }

    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Block until the previous frame's work has finished on the GPU.
    pub fn wait_for_previous_frame(&mut self) {
        if let Some(index) = self.last_submission.take() {
            self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
    }

    /// Submit compute before graphics in one call; the queue runs them in
    /// order, so draws see this frame's cull results.
    pub fn submit(&mut self, buffers: impl IntoIterator<Item = wgpu::CommandBuffer>) {
        self.last_submission = Some(self.queue.submit(buffers));
    }
}
