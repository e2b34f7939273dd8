// error.rs — the pipeline's error taxonomy.
//
// Every variant is fatal: nothing in this crate retries or recovers.
// The pipeline stops at the first error and the caller exits non-zero.
//
// Variant groups:
//   initialization — NoGpuAdapter, DeviceRequest
//   compilation    — KernelSource, ShaderCompile, EntryPoint
//   runtime        — Dispatch, ReadBack
//   configuration  — InvalidCoefficients
//
// Compilation errors carry the complete compiler diagnostic text. The
// kernel payload is external and kernel-source bugs are the most common
// failure in practice, so the build log is the primary operator-facing
// surface — never truncate it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from GPU initialization, payload compilation, and filter
/// execution. All are fatal; none are retried internally.
#[derive(Debug, Error)]
pub enum FilterError {
    /// No real GPU adapter found. Software rasterizers (llvmpipe and
    /// friends) are deliberately never selected — running the filters on
    /// a CPU adapter is out of scope, not a fallback.
    #[error(
        "no GPU adapter found (only CPU/software renderers visible); \
         this pipeline requires a real GPU and has no software fallback"
    )]
    NoGpuAdapter,

    /// The adapter refused our device request (driver issue, unsupported
    /// limits).
    #[error("GPU device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// The kernel payload file could not be read.
    #[error("could not read kernel source `{path}`: {source}")]
    KernelSource {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The kernel payload failed to compile. `log` is the full compiler
    /// diagnostic (naga's annotated source listing).
    #[error("kernel source failed to compile:\n{log}")]
    ShaderCompile { log: String },

    /// A required entry point is missing from the payload, or its
    /// bindings do not match the payload contract. Detected at program
    /// build time, before any dispatch.
    #[error("kernel entry point `{entry}` missing or invalid:\n{log}")]
    EntryPoint { entry: &'static str, log: String },

    /// The backend rejected an argument binding or dispatch.
    #[error("{filter} dispatch failed: {log}")]
    Dispatch { filter: &'static str, log: String },

    /// Mapping the read-back buffer failed after a dispatch.
    #[error("read-back of {filter} output failed: {source}")]
    ReadBack {
        filter: &'static str,
        source: wgpu::BufferAsyncError,
    },

    /// Rejected smoothing-kernel parameters. The generator requires an
    /// odd, positive size and a strictly positive sigma.
    #[error(
        "invalid smoothing kernel: size {kernel_size} (must be odd and > 0), \
         sigma {sigma} (must be > 0)"
    )]
    InvalidCoefficients { kernel_size: u32, sigma: f32 },
}
