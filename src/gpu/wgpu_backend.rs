//! Implémentation wgpu du backend: rendu hors écran dans un anneau de
//! cibles (double ou triple buffering), LUT de palette en texture 1-D.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};
use crate::gpu::backend::{FrameUniforms, GpuBackend, ProgramKey, QUAD_VERTICES};
use crate::gpu::shaders::{FRAGMENT_ENTRY, VERTEX_ENTRY};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
}

pub struct WgpuPalette {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    entries: u32,
}

pub struct WgpuGeometry {
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
}

/// Objets liés à un device; recréés en bloc après une perte de contexte.
struct DeviceResources {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
}

pub struct WgpuBackend {
    adapter: wgpu::Adapter,
    resources: DeviceResources,
    lost: Arc<AtomicBool>,
    buffer_count: usize,
    targets: Vec<wgpu::Texture>,
    next_target: usize,
    last_completed: Option<usize>,
    width: u32,
    height: u32,
    palette_bytes: LutBytes,
}

/// Octets des LUT résidentes. La nouvelle LUT est créée avant la
/// destruction de l'ancienne: les deux sont comptées entre les deux appels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LutBytes(u64);

impl LutBytes {
    fn allocate(&mut self, entries: u32) {
        self.0 += u64::from(entries) * 4;
    }

    fn release(&mut self, entries: u32) {
        self.0 = self.0.saturating_sub(u64::from(entries) * 4);
    }
}

impl WgpuBackend {
    /// Acquiert un adaptateur et un device (pas d'anticrénelage matériel,
    /// préférence haute performance). `buffer_count` est ramené à 2 ou 3.
    pub fn new(buffer_count: usize) -> Result<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok_or_else(|| RenderError::ContextUnavailable("no compatible GPU adapter".to_string()))?;

            let info = adapter.get_info();
            info!("GPU adapter: {} ({:?}, {:?})", info.name, info.device_type, info.backend);

            let lost = Arc::new(AtomicBool::new(false));
            let resources = create_device_resources(&adapter, &lost).await?;

            Ok(Self {
                adapter,
                resources,
                lost,
                buffer_count: buffer_count.clamp(2, 3),
                targets: Vec::new(),
                next_target: 0,
                last_completed: None,
                width: 0,
                height: 0,
                palette_bytes: LutBytes::default(),
            })
        })
    }

    /// Drapeau partagé levé quand le device est perdu. L'hôte peut aussi le
    /// lever pour simuler une perte.
    pub fn loss_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Indice de la dernière cible terminée (celle qui serait présentée).
    pub fn last_completed_target(&self) -> Option<usize> {
        self.last_completed
    }

    /// Relit la dernière frame terminée en RGBA8 (`width * height * 4` octets).
    pub fn read_latest_frame(&self) -> Result<(u32, u32, Vec<u8>)> {
        let index = self.last_completed.ok_or(RenderError::NotReady(crate::gpu::ManagerState::Uninitialized))?;
        let texture = &self.targets[index];
        let device = &self.resources.device;

        let unpadded = self.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let size = padded as u64 * self.height as u64;

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-readback-encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
        self.resources.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = sender.send(r);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RenderError::Image(format!("frame readback failed: {e}"))),
            Err(_) => return Err(RenderError::ContextLost),
        }

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * self.height) as usize);
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        readback.unmap();

        Ok((self.width, self.height, pixels))
    }

    fn create_targets(&mut self) {
        let device = &self.resources.device;
        self.targets = (0..self.buffer_count)
            .map(|i| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("frame-target-{i}")),
                    size: wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: TARGET_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .collect();
        self.next_target = 0;
        self.last_completed = None;
    }

    fn check_lost(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            return Err(RenderError::ContextLost);
        }
        Ok(())
    }
}

async fn create_device_resources(adapter: &wgpu::Adapter, lost: &Arc<AtomicBool>) -> Result<DeviceResources> {
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("fractal-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            },
            None,
        )
        .await
        .map_err(|e| RenderError::ContextUnavailable(e.to_string()))?;

    let flag = Arc::clone(lost);
    device.on_uncaptured_error(Box::new(move |err| match err {
        wgpu::Error::OutOfMemory { .. } => {
            error!("GPU out of memory, treating as context loss");
            flag.store(true, Ordering::Release);
        }
        other => error!("Uncaptured GPU error: {other}"),
    }));

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("fractal-bind-group-layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<FrameUniforms>() as u64),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D1,
                    multisampled: false,
                },
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("fractal-pipeline-layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("fractal-uniforms"),
        size: std::mem::size_of::<FrameUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    Ok(DeviceResources { device, queue, bind_group_layout, pipeline_layout, uniform_buffer })
}

impl GpuBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Palette = WgpuPalette;
    type Geometry = WgpuGeometry;

    fn compile_program(&mut self, key: ProgramKey, source: &str) -> Result<WgpuProgram> {
        self.check_lost()?;
        let device = &self.resources.device;
        let label = key.label();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&self.resources.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: VERTEX_ENTRY,
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: FRAGMENT_ENTRY,
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ProgramCompilationFailed {
                variant: key.variant,
                precision: key.precision,
                diagnostics: err.to_string(),
            });
        }
        Ok(WgpuProgram { pipeline })
    }

    fn create_palette_texture(&mut self, rgba: &[u8]) -> Result<WgpuPalette> {
        self.check_lost()?;
        let entries = (rgba.len() / 4) as u32;
        if entries == 0 {
            return Err(RenderError::Config("empty palette lookup table".to_string()));
        }
        let size = wgpu::Extent3d { width: entries, height: 1, depth_or_array_layers: 1 };
        let texture = self.resources.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("palette-lut"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D1,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.resources.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba[..entries as usize * 4],
            wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(entries * 4), rows_per_image: None },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("palette-lut-view"),
            dimension: Some(wgpu::TextureViewDimension::D1),
            ..Default::default()
        });
        self.palette_bytes.allocate(entries);
        Ok(WgpuPalette { texture, view, entries })
    }

    fn create_geometry(&mut self) -> Result<WgpuGeometry> {
        self.check_lost()?;
        let vertex_buffer = self.resources.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fullscreen-quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Ok(WgpuGeometry { vertex_buffer, vertex_count: QUAD_VERTICES.len() as u32 })
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.check_lost()?;
        let limit = self.resources.device.limits().max_texture_dimension_2d;
        let (width, height) = (width.clamp(1, limit), height.clamp(1, limit));
        if (width, height) == (self.width, self.height) && self.targets.len() == self.buffer_count {
            return Ok(());
        }
        for target in self.targets.drain(..) {
            target.destroy();
        }
        self.width = width;
        self.height = height;
        self.create_targets();
        Ok(())
    }

    fn draw(
        &mut self,
        program: &WgpuProgram,
        palette: &WgpuPalette,
        geometry: &WgpuGeometry,
        uniforms: &FrameUniforms,
    ) -> Result<()> {
        self.check_lost()?;
        if self.targets.is_empty() {
            return Err(RenderError::NotReady(crate::gpu::ManagerState::Uninitialized));
        }
        let index = self.next_target;
        let view = self.targets[index].create_view(&wgpu::TextureViewDescriptor::default());
        let res = &self.resources;

        res.queue.write_buffer(&res.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let bind_group = res.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal-bind-group"),
            layout: &res.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: res.uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&palette.view) },
            ],
        });

        let mut encoder = res.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("fractal-frame-encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fractal-frame-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, self.width as f32, self.height as f32, 0.0, 1.0);
            pass.set_scissor_rect(0, 0, self.width, self.height);
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
            pass.draw(0..geometry.vertex_count, 0..1);
        }
        res.queue.submit(Some(encoder.finish()));

        self.last_completed = Some(index);
        self.next_target = (index + 1) % self.targets.len();
        Ok(())
    }

    fn destroy_program(&mut self, program: WgpuProgram) {
        drop(program.pipeline);
    }

    fn destroy_palette_texture(&mut self, palette: WgpuPalette) {
        palette.texture.destroy();
        self.palette_bytes.release(palette.entries);
    }

    fn destroy_geometry(&mut self, geometry: WgpuGeometry) {
        geometry.vertex_buffer.destroy();
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn restore_context(&mut self) -> Result<()> {
        warn!("Recreating GPU device");
        let resources = pollster::block_on(create_device_resources(&self.adapter, &self.lost))?;
        self.resources = resources;
        self.targets.clear();
        self.width = 0;
        self.height = 0;
        self.palette_bytes = LutBytes::default();
        self.last_completed = None;
        self.lost.store(false, Ordering::Release);
        Ok(())
    }

    fn memory_estimate(&self) -> u64 {
        let targets = self.targets.len() as u64 * self.width as u64 * self.height as u64 * 4;
        let vertices = std::mem::size_of_val(&QUAD_VERTICES) as u64;
        let uniforms = std::mem::size_of::<FrameUniforms>() as u64;
        targets + self.palette_bytes.0 + vertices + uniforms
    }
}
