//! wgpu id target.
//!
//! Draws into an `R32Uint` color texture with a `Depth32Float` depth
//! buffer. Geometry is pulled in the vertex shader from storage buffers, so
//! one shader serves triangles, lines and points. Draws are recorded while
//! bound and submitted as a single render pass on `unbind`.

use std::sync::Arc;

use glam::UVec2;
use snapscope_core::{IndexArrays, MAX_CLIP_PLANES};

use crate::buffer::{
    create_storage_buffer, create_uniform_buffer, padded_bytes_per_row, unpad_rows, update_buffer,
};
use crate::error::{RenderError, RenderResult};
use crate::target::{DrawParams, IdBuffer, IdRenderTarget, PassParams, TargetStats};

const ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Pass uniforms (176 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PassUniforms {
    view_proj: [[f32; 4]; 4],
    clip_planes: [[f32; 4]; MAX_CLIP_PLANES],
    clip_count: [u32; 4],
}

impl PassUniforms {
    fn from_params(pass: &PassParams) -> Self {
        let mut clip_planes = [[0.0; 4]; MAX_CLIP_PLANES];
        let count = pass.clip_planes.len().min(MAX_CLIP_PLANES);
        for (slot, plane) in clip_planes.iter_mut().zip(&pass.clip_planes) {
            *slot = plane.to_array();
        }
        Self {
            view_proj: pass.view_projection.to_cols_array_2d(),
            clip_planes,
            clip_count: [count as u32, 0, 0, 0],
        }
    }
}

impl Default for PassUniforms {
    fn default() -> Self {
        Self::from_params(&PassParams {
            view_projection: glam::Mat4::IDENTITY,
            clip_planes: Vec::new(),
        })
    }
}

/// Per-draw uniforms (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    model: [[f32; 4]; 4],
    id_offset: u32,
    depth_bias: f32,
    _pad: [u32; 2],
}

/// Primitive batch kinds, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Triangles,
    Lines,
    Points,
}

impl BatchKind {
    const ALL: [BatchKind; 3] = [BatchKind::Triangles, BatchKind::Lines, BatchKind::Points];

    fn vertices_per_primitive(self) -> u32 {
        match self {
            BatchKind::Triangles => 3,
            BatchKind::Lines => 2,
            BatchKind::Points => 1,
        }
    }

    fn pipeline_index(self) -> usize {
        self as usize
    }
}

struct IndexBatch {
    indices: wgpu::Buffer,
    primitives: u32,
}

/// Storage buffers for one geometry index cache.
pub struct GpuBatches {
    positions: Option<wgpu::Buffer>,
    batches: [Option<IndexBatch>; 3],
}

impl GpuBatches {
    /// Number of primitives across all batches.
    #[must_use]
    pub fn primitive_count(&self) -> u32 {
        self.batches.iter().flatten().map(|b| b.primitives).sum()
    }
}

struct PendingDraw {
    pipeline: usize,
    bind_group: wgpu::BindGroup,
    vertex_count: u32,
}

/// wgpu implementation of [`IdRenderTarget`].
pub struct GpuTarget {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: [wgpu::RenderPipeline; 3],
    bind_group_layout: wgpu::BindGroupLayout,
    pass_buffer: wgpu::Buffer,
    id_texture: wgpu::Texture,
    id_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    bound: bool,
    needs_clear: bool,
    pending: Vec<PendingDraw>,
    stats: TargetStats,
}

impl GpuTarget {
    /// Creates a target on a new headless device.
    pub async fn new_headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        log::info!("snap target adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("snapscope device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        Self::with_device(device, queue, width, height)
    }

    /// Creates a target sharing an existing device and queue.
    pub fn with_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        check_size(width, height)?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Snap Id Bind Group Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::VERTEX),
                storage_entry(2),
                storage_entry(3),
            ],
        });

        let pipelines = create_pipelines(&device, &bind_group_layout);

        let pass_buffer = create_uniform_buffer(
            &device,
            &PassUniforms::default(),
            Some("Snap Pass Uniforms"),
        );

        let (id_texture, id_view, depth_view) = create_targets(&device, width, height);
        let readback_buffer = create_readback_buffer(&device, width, height);

        Ok(Self {
            device,
            queue,
            pipelines,
            bind_group_layout,
            pass_buffer,
            id_texture,
            id_view,
            depth_view,
            readback_buffer,
            width,
            height,
            bound: false,
            needs_clear: true,
            pending: Vec::new(),
            stats: TargetStats::default(),
        })
    }

    /// The device this target renders with.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Records pending draws (and a pending clear) and submits them.
    fn flush(&mut self) {
        if self.pending.is_empty() && !self.needs_clear {
            return;
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Snap Id Encoder"),
            });

        let (color_load, depth_load) = if self.needs_clear {
            (wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT), wgpu::LoadOp::Clear(1.0))
        } else {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        };

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Snap Id Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.id_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for draw in &self.pending {
                render_pass.set_pipeline(&self.pipelines[draw.pipeline]);
                render_pass.set_bind_group(0, &draw.bind_group, &[]);
                render_pass.draw(0..draw.vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.pending.clear();
        self.needs_clear = false;
    }
}

impl IdRenderTarget for GpuTarget {
    type Batches = GpuBatches;

    fn upload(&mut self, arrays: &Arc<IndexArrays>) -> RenderResult<GpuBatches> {
        if arrays.positions.is_empty() || arrays.is_empty() {
            return Ok(GpuBatches {
                positions: None,
                batches: [None, None, None],
            });
        }

        let positions: Vec<f32> = arrays.positions.iter().flat_map(|p| p.to_array()).collect();
        let positions = create_storage_buffer(&self.device, &positions, Some("Snap Positions"));

        let tris: Vec<u32> = arrays.tris.iter().flatten().copied().collect();
        let edges: Vec<u32> = arrays.edges.iter().flatten().copied().collect();
        let make = |indices: &[u32], primitives: usize, label: &str| {
            (primitives > 0).then(|| IndexBatch {
                indices: create_storage_buffer(&self.device, indices, Some(label)),
                primitives: primitives as u32,
            })
        };

        Ok(GpuBatches {
            positions: Some(positions),
            batches: [
                make(&tris, arrays.tris.len(), "Snap Triangle Indices"),
                make(&edges, arrays.edges.len(), "Snap Edge Indices"),
                make(&arrays.points, arrays.points.len(), "Snap Point Indices"),
            ],
        })
    }

    fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        check_size(width, height)?;
        let (id_texture, id_view, depth_view) = create_targets(&self.device, width, height);
        self.id_texture = id_texture;
        self.id_view = id_view;
        self.depth_view = depth_view;
        self.readback_buffer = create_readback_buffer(&self.device, width, height);
        self.width = width;
        self.height = height;
        self.needs_clear = true;
        self.pending.clear();
        self.stats.resizes += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.needs_clear = true;
        self.stats.clears += 1;
    }

    fn bind(&mut self, pass: &PassParams) {
        update_buffer(&self.queue, &self.pass_buffer, &PassUniforms::from_params(pass));
        self.bound = true;
    }

    fn draw(&mut self, batches: &GpuBatches, params: &DrawParams) -> RenderResult<u32> {
        if !self.bound {
            return Err(RenderError::NotBound);
        }
        let Some(positions) = &batches.positions else {
            return Ok(0);
        };

        let biases = params.biases();
        let mut id_offset = params.id_offset;
        for kind in BatchKind::ALL {
            let Some(batch) = &batches.batches[kind.pipeline_index()] else {
                continue;
            };

            let uniforms = create_uniform_buffer(
                &self.device,
                &DrawUniforms {
                    model: params.model.to_cols_array_2d(),
                    id_offset,
                    depth_bias: biases[kind.pipeline_index()],
                    _pad: [0; 2],
                },
                Some("Snap Draw Uniforms"),
            );

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Snap Draw Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.pass_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: positions.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: batch.indices.as_entire_binding(),
                    },
                ],
            });

            self.pending.push(PendingDraw {
                pipeline: kind.pipeline_index(),
                bind_group,
                vertex_count: batch.primitives * kind.vertices_per_primitive(),
            });
            id_offset += batch.primitives;
        }

        self.stats.draw_calls += 1;
        Ok(id_offset - params.id_offset)
    }

    fn unbind(&mut self) -> RenderResult<()> {
        if !self.bound {
            return Err(RenderError::NotBound);
        }
        self.flush();
        self.bound = false;
        Ok(())
    }

    fn read_back(&mut self, out: &mut IdBuffer) -> RenderResult<()> {
        self.flush();

        let bytes_per_row = padded_bytes_per_row(self.width, 4);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Snap Readback Encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.id_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.readback_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|_| RenderError::Timeout)?;
        rx.recv()
            .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?
            .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let bytes = unpad_rows(
            &data,
            bytes_per_row as usize,
            self.width as usize * 4,
            self.height as usize,
        );
        drop(data);
        self.readback_buffer.unmap();

        out.assign(
            self.width,
            self.height,
            bytes
                .chunks_exact(4)
                .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        );
        self.stats.readbacks += 1;
        Ok(())
    }

    fn stats(&self) -> TargetStats {
        self.stats
    }
}

fn check_size(width: u32, height: u32) -> RenderResult<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::ZeroSize { width, height });
    }
    Ok(())
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_pipelines(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> [wgpu::RenderPipeline; 3] {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Snap Id Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/snap_id.wgsl").into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Snap Id Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    BatchKind::ALL.map(|kind| {
        let (entry_point, topology, label) = match kind {
            BatchKind::Triangles => (
                "vs_tris",
                wgpu::PrimitiveTopology::TriangleList,
                "Snap Id Triangle Pipeline",
            ),
            BatchKind::Lines => (
                "vs_lines",
                wgpu::PrimitiveTopology::LineList,
                "Snap Id Line Pipeline",
            ),
            BatchKind::Points => (
                "vs_points",
                wgpu::PrimitiveTopology::PointList,
                "Snap Id Point Pipeline",
            ),
        };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(entry_point),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ID_FORMAT,
                    blend: None, // Integer target, ids are written verbatim
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology,
                cull_mode: None,
                ..wgpu::PrimitiveState::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    })
}

fn create_targets(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let id_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Snap Id Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ID_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let id_view = id_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Snap Depth Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

    (id_texture, id_view, depth_view)
}

fn create_readback_buffer(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Snap Readback Buffer"),
        size: u64::from(padded_bytes_per_row(width, 4)) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}
