//! wgpu graphics device
//!
//! [`RenderEngine`] owns the window surface, the wgpu device and queue, and
//! every GPU object the engine creates through [`GraphicsDevice`]. Each
//! [`CommandList`] becomes one command encoder submitted to the single queue,
//! which gives the FIFO ordering the engine relies on.

use std::{
    iter,
    sync::{Arc, Mutex},
};

use wgpu::TextureFormat;

use crate::error::DeviceError;
use crate::gfx::device::{
    validate_cell_bindings, BindGroupDescriptor, BindGroupHandle, BufferDescriptor, BufferHandle,
    BufferUsages, Command, CommandList, ComputeKernel, ComputePipelineDescriptor, GraphicsDevice,
    PipelineHandle, RenderKernel, RenderPipelineDescriptor, CELL_STATE_IN_SLOT,
    CELL_STATE_OUT_SLOT, GRID_UNIFORM_SLOT,
};
use crate::gfx::quad::QuadVertex;
use crate::wgpu_utils::binding_types;

const LIFE_STEP_SHADER: &str = include_str!("shaders/life_step.wgsl");
const CELL_QUADS_SHADER: &str = include_str!("shaders/cell_quads.wgsl");

enum GpuPipeline {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

pub struct RenderEngine {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    format: TextureFormat,

    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,

    buffers: Vec<wgpu::Buffer>,
    pipelines: Vec<GpuPipeline>,
    bind_groups: Vec<wgpu::BindGroup>,

    /// Surface texture drawn this tick, presented by `present`.
    frame: Option<wgpu::SurfaceTexture>,
    lost: Arc<Mutex<Option<String>>>,
}

impl RenderEngine {
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<RenderEngine, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|err| DeviceError::Surface(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| DeviceError::NoAdapter(err.to_string()))?;
        log::info!("Using adapter {:?}", adapter.get_info());

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Life Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_storage_buffer_binding_size: adapter_limits
                        .max_storage_buffer_binding_size,
                    max_buffer_size: adapter_limits.max_buffer_size,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| DeviceError::DeviceRequest(err.to_string()))?;

        let lost = Arc::new(Mutex::new(None));
        let lost_flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({reason:?}): {message}");
            if let Ok(mut lost) = lost_flag.lock() {
                *lost = Some(message);
            }
        });
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            log::error!("Uncaptured wgpu error: {err}");
        }));

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| DeviceError::Surface("surface reports no formats".to_string()))?;
        let alpha_mode = surface_capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoNoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cell Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: GRID_UNIFORM_SLOT,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::COMPUTE,
                    ty: binding_types::uniform(),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: CELL_STATE_IN_SLOT,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::COMPUTE,
                    ty: binding_types::storage_buffer_read_only(),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: CELL_STATE_OUT_SLOT,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: binding_types::storage_buffer_read_write(),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cell Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Ok(RenderEngine {
            device: device.into(),
            config,
            format,
            surface,
            queue: queue.into(),
            bind_group_layout,
            pipeline_layout,
            buffers: Vec::new(),
            pipelines: Vec::new(),
            bind_groups: Vec::new(),
            frame: None,
            lost,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    fn check_alive(&self) -> Result<(), DeviceError> {
        match self.lost.lock() {
            Ok(lost) => match lost.as_ref() {
                Some(message) => Err(DeviceError::Lost(message.clone())),
                None => Ok(()),
            },
            Err(_) => Err(DeviceError::Lost("device state poisoned".to_string())),
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&wgpu::Buffer, DeviceError> {
        self.buffers.get(handle.0).ok_or(DeviceError::InvalidHandle {
            kind: "buffer",
            index: handle.0,
        })
    }

    fn bind_group(&self, handle: BindGroupHandle) -> Result<&wgpu::BindGroup, DeviceError> {
        self.bind_groups
            .get(handle.0)
            .ok_or(DeviceError::InvalidHandle {
                kind: "bind group",
                index: handle.0,
            })
    }

    fn pipeline(&self, handle: PipelineHandle) -> Result<&GpuPipeline, DeviceError> {
        self.pipelines.get(handle.0).ok_or(DeviceError::InvalidHandle {
            kind: "pipeline",
            index: handle.0,
        })
    }

    /// Run `create` inside a validation error scope.
    fn validated<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let created = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(DeviceError::Validation(err.to_string())),
            None => Ok(created),
        }
    }

    /// Make sure a surface texture is held for this tick. Returns `false` when
    /// the surface cannot provide one right now and the draw should be skipped.
    fn acquire_frame(&mut self) -> Result<bool, DeviceError> {
        if self.frame.is_some() {
            return Ok(true);
        }
        match self.surface.get_current_texture() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(true)
            }
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                log::warn!("Surface {err}, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                Ok(false)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(DeviceError::OutOfMemory),
            Err(err) => {
                log::warn!("Skipping frame: {err}");
                Ok(false)
            }
        }
    }

    fn poll_wait(&self) -> Result<(), DeviceError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|err| DeviceError::Lost(err.to_string()))
    }
}

fn wgpu_usage(usage: BufferUsages) -> wgpu::BufferUsages {
    [
        (BufferUsages::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsages::UNIFORM, wgpu::BufferUsages::UNIFORM),
        (BufferUsages::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsages::COPY_DST, wgpu::BufferUsages::COPY_DST),
        (BufferUsages::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
    ]
    .into_iter()
    .filter(|(ours, _)| usage.contains(*ours))
    .fold(wgpu::BufferUsages::empty(), |acc, (_, theirs)| acc | theirs)
}

fn life_step_source(tile_x: u32, tile_y: u32) -> String {
    LIFE_STEP_SHADER
        .replace("{{TILE_X}}", &tile_x.to_string())
        .replace("{{TILE_Y}}", &tile_y.to_string())
}

impl GraphicsDevice for RenderEngine {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<BufferHandle, DeviceError> {
        self.check_alive()?;
        if desc.size > self.device.limits().max_buffer_size {
            return Err(DeviceError::OutOfMemory);
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage: wgpu_usage(desc.usage),
            mapped_at_creation: false,
        });
        self.buffers.push(buffer);
        Ok(BufferHandle(self.buffers.len() - 1))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        self.check_alive()?;
        let buffer = self.buffer(buffer)?;
        if offset + data.len() as u64 > buffer.size() {
            return Err(DeviceError::Validation(format!(
                "write of {} bytes at {offset} overruns a {} byte buffer",
                data.len(),
                buffer.size()
            )));
        }
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError> {
        self.check_alive()?;
        let ComputeKernel::LifeStep { tile } = desc.kernel;

        let limits = self.device.limits();
        if tile.x == 0
            || tile.y == 0
            || tile.x > limits.max_compute_workgroup_size_x
            || tile.y > limits.max_compute_workgroup_size_y
            || tile.x.saturating_mul(tile.y) > limits.max_compute_invocations_per_workgroup
        {
            return Err(DeviceError::Validation(format!(
                "{}: tile {}x{} exceeds device workgroup limits",
                desc.label, tile.x, tile.y
            )));
        }

        let source = life_step_source(tile.x, tile.y);
        let pipeline = self.validated(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Life step shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&self.pipeline_layout),
                module: &shader,
                entry_point: Some("computeMain"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        self.pipelines.push(GpuPipeline::Compute(pipeline));
        Ok(PipelineHandle(self.pipelines.len() - 1))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError> {
        self.check_alive()?;
        let RenderKernel::CellQuads = desc.kernel;

        let format = self.format;
        let pipeline = self.validated(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Cell shader"),
                source: wgpu::ShaderSource::Wgsl(CELL_QUADS_SHADER.into()),
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vertexMain"),
                    buffers: &[QuadVertex::desc()],
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                    unclipped_depth: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fragmentMain"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview: None,
                cache: None,
            })
        })?;

        self.pipelines.push(GpuPipeline::Render(pipeline));
        Ok(PipelineHandle(self.pipelines.len() - 1))
    }

    fn create_bind_group(
        &mut self,
        desc: &BindGroupDescriptor,
    ) -> Result<BindGroupHandle, DeviceError> {
        self.check_alive()?;
        validate_cell_bindings(desc.entries)?;

        let entries = desc
            .entries
            .iter()
            .map(|entry| {
                Ok(wgpu::BindGroupEntry {
                    binding: entry.binding,
                    resource: self.buffer(entry.buffer)?.as_entire_binding(),
                })
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;

        let bind_group = self.validated(|device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(desc.label),
                layout: &self.bind_group_layout,
                entries: &entries,
            })
        })?;

        self.bind_groups.push(bind_group);
        Ok(BindGroupHandle(self.bind_groups.len() - 1))
    }

    fn submit(&mut self, commands: CommandList) -> Result<(), DeviceError> {
        self.check_alive()?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(commands.label()),
            });

        for command in commands.commands() {
            match command {
                Command::Dispatch {
                    pipeline,
                    bind_group,
                    workgroups,
                } => {
                    let GpuPipeline::Compute(pipeline) = self.pipeline(*pipeline)? else {
                        return Err(DeviceError::Validation(
                            "dispatch with a render pipeline".to_string(),
                        ));
                    };
                    let bind_group = self.bind_group(*bind_group)?;

                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Simulation Pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
                }
                Command::DrawInstanced {
                    pipeline,
                    bind_group,
                    vertex_buffer,
                    vertices,
                    instances,
                    clear_color,
                } => {
                    if !self.acquire_frame()? {
                        continue;
                    }
                    let Some(frame) = self.frame.as_ref() else {
                        continue;
                    };
                    let view = frame.texture.create_view(&wgpu::TextureViewDescriptor {
                        format: Some(self.format),
                        ..Default::default()
                    });

                    let GpuPipeline::Render(pipeline) = self.pipeline(*pipeline)? else {
                        return Err(DeviceError::Validation(
                            "draw with a compute pipeline".to_string(),
                        ));
                    };
                    let bind_group = self.bind_group(*bind_group)?;
                    let vertex_buffer = self.buffer(*vertex_buffer)?;

                    let [r, g, b, a] = *clear_color;
                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Render Pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        occlusion_query_set: None,
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                    pass.draw(vertices.clone(), instances.clone());
                }
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
        self.check_alive()
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        self.check_alive()?;
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, DeviceError> {
        self.check_alive()?;
        let source = self.buffer(buffer)?;
        if !source.usage().contains(wgpu::BufferUsages::COPY_SRC) {
            return Err(DeviceError::Validation(
                "buffer is not a copy source".to_string(),
            ));
        }

        let size = source.size();
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging_buffer, 0, size);
        self.queue.submit(iter::once(encoder.finish()));

        let slice = staging_buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.poll_wait()?;

        match pollster::block_on(rx) {
            Ok(Ok(())) => {
                let bytes = slice.get_mapped_range().to_vec();
                staging_buffer.unmap();
                Ok(bytes)
            }
            Ok(Err(err)) => Err(DeviceError::Lost(err.to_string())),
            Err(_) => Err(DeviceError::Lost("readback was cancelled".to_string())),
        }
    }

    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        self.check_alive()?;
        self.poll_wait()
    }
}
