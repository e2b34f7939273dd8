// program.rs — kernel payload loading and compilation.
//
// The filter kernels are an external WGSL file, not part of this crate:
// the payload is read in full at startup, compiled once, and the result
// is shared read-only by all four filter dispatches. `Filter` is the
// versioned entry-point contract between host and payload — a payload
// that is missing an entry point (or declares bindings that don't match
// `bind_group_layout`) fails at build time, never at first dispatch.
//
// DIAGNOSTICS:
// Shader compilation and pipeline creation run under wgpu validation
// error scopes. On failure the scope yields naga's full annotated
// diagnostic for the payload source, which is the primary operator-facing
// error surface of the whole pipeline: the payload is external, and
// kernel-source bugs are both common and invisible to the Rust compiler.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::device::GpuDevice;
use crate::error::FilterError;

// ---------------------------------------------------------------------------
// Payload contract
// ---------------------------------------------------------------------------

/// The four filters, in their fixed execution order.
///
/// Each variant names one required entry point in the kernel payload.
/// Every entry point sees the same `@group(0)` bindings (see
/// [`FilterProgram::bind_group_layout`]); which of them an entry point
/// actually reads is the filter's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Gaussian smoothing. Consumes the coefficient buffer + kernel size.
    Gaussian,
    /// Edge-aware smoothing. Consumes the spatial/intensity sigmas.
    Bilateral,
    /// Sharpening. No extra arguments.
    Sharpen,
    /// Noise reduction (median). Consumes the window radius.
    Median,
}

impl Filter {
    /// Fixed dispatch order: smoothing → edge-aware smoothing →
    /// sharpening → noise reduction.
    pub const SEQUENCE: [Filter; 4] = [
        Filter::Gaussian,
        Filter::Bilateral,
        Filter::Sharpen,
        Filter::Median,
    ];

    /// Entry-point name this filter binds to in the payload.
    pub fn entry_point(self) -> &'static str {
        match self {
            Filter::Gaussian => "gaussian_filter",
            Filter::Bilateral => "bilateral_filter",
            Filter::Sharpen => "sharpen_filter",
            Filter::Median => "median_filter",
        }
    }

    /// Deterministic file name for this filter's persisted result.
    pub fn output_name(self) -> &'static str {
        match self {
            Filter::Gaussian => "gaussian_filtered.png",
            Filter::Bilateral => "bilateral_filtered.png",
            Filter::Sharpen => "sharpened.png",
            Filter::Median => "median_filtered.png",
        }
    }

    fn index(self) -> usize {
        match self {
            Filter::Gaussian => 0,
            Filter::Bilateral => 1,
            Filter::Sharpen => 2,
            Filter::Median => 3,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Filter::Gaussian => "gaussian",
            Filter::Bilateral => "bilateral",
            Filter::Sharpen => "sharpen",
            Filter::Median => "median",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Payload loading
// ---------------------------------------------------------------------------

/// Read the kernel payload in full from `path`.
///
/// One-shot: the payload is loaded exactly once per process. A missing
/// or unreadable file is [`FilterError::KernelSource`].
pub fn load_kernel_source(path: &Path) -> Result<String, FilterError> {
    fs::read_to_string(path).map_err(|source| FilterError::KernelSource {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// FilterProgram
// ---------------------------------------------------------------------------

/// The compiled kernel payload: one shader module, one shared bind group
/// layout, and one compute pipeline per filter entry point.
///
/// Immutable once built. Build exactly once per process via
/// [`FilterProgram::build`]; all four filter dispatches share it
/// read-only.
#[derive(Debug)]
pub struct FilterProgram {
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: [wgpu::ComputePipeline; 4],
}

impl FilterProgram {
    /// Compile `source` and create the four filter pipelines.
    ///
    /// Pipelines for every entry point are created eagerly so that a
    /// payload missing one of them fails here, with the compiler's
    /// diagnostic, rather than at dispatch time.
    ///
    /// # Errors
    /// [`FilterError::ShaderCompile`] when the WGSL does not parse or
    /// validate, [`FilterError::EntryPoint`] when a required entry point
    /// is missing or incompatible with the shared bind group layout.
    pub fn build(gpu: &GpuDevice, source: &str) -> Result<Self, FilterError> {
        // Compile under a validation scope to capture the full naga log.
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("filter payload"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(FilterError::ShaderCompile {
                log: scope_error_text(err),
            });
        }
        log::info!("kernel payload compiled ({} bytes of WGSL)", source.len());

        let bind_group_layout = create_bind_group_layout(&gpu.device);
        let pipeline_layout =
            gpu.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("filter pipeline layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

        // One pipeline per entry point, each under its own scope so the
        // error names the offending filter.
        let mut pipelines = Vec::with_capacity(Filter::SEQUENCE.len());
        for filter in Filter::SEQUENCE {
            let entry = filter.entry_point();
            gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline =
                gpu.device
                    .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(entry),
                        layout: Some(&pipeline_layout),
                        module: &module,
                        entry_point: entry,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        cache: None,
                    });
            if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
                return Err(FilterError::EntryPoint {
                    entry,
                    log: scope_error_text(err),
                });
            }
            pipelines.push(pipeline);
        }

        let pipelines: [wgpu::ComputePipeline; 4] = pipelines
            .try_into()
            .unwrap_or_else(|_| unreachable!("SEQUENCE has exactly 4 filters"));

        Ok(FilterProgram {
            bind_group_layout,
            pipelines,
        })
    }

    /// The compiled pipeline for one filter entry point.
    pub fn pipeline(&self, filter: Filter) -> &wgpu::ComputePipeline {
        &self.pipelines[filter.index()]
    }

    /// The `@group(0)` layout shared by every entry point.
    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }
}

/// The `@group(0)` bindings every payload entry point is compiled
/// against:
///
///   0 — source image, `texture_2d<f32>`, read-only
///   1 — destination image, `texture_storage_2d<rgba8unorm, write>`
///   2 — `FilterParams` uniform (scalar arguments)
///   3 — coefficient buffer, read-only `array<f32>` storage
///
/// Entry points that don't use a binding simply don't declare it; the
/// host always binds all four.
fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("filter BGL"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// Extract the diagnostic text from a captured scope error. Validation
/// errors carry naga's full annotated log in `description`.
fn scope_error_text(err: wgpu::Error) -> String {
    match err {
        wgpu::Error::Validation { description, .. } => description,
        other => other.to_string(),
    }
}
