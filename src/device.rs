// device.rs — wgpu compute backend.
//
// Responsibilities:
//   - Enumerate adapters and select the first real GPU.
//   - Own the `wgpu::Device` + in-order `wgpu::Queue` for the process
//     lifetime; every other component borrows this handle.
//   - Translate image dimensions into workgroup counts for dispatch.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power-preference heuristics that
// may grab llvmpipe/softpipe where a software renderer appears as a valid
// adapter. We enumerate explicitly, log every candidate, and take the
// first one whose device type is a real GPU. There is no software
// fallback: running the filters on a CPU adapter is out of scope, so
// finding none is a fatal initialization error.
//
// QUEUE ORDERING:
// All filter dispatches go through the one `wgpu::Queue` owned here.
// Submissions on a single queue execute in program order, which is what
// makes the reuse of a single destination image across filters sound —
// provided the caller reads each result back before the next submit.

use std::fmt;

use crate::error::FilterError;

/// Workgroup dimensions fixed by the kernel payload contract.
///
/// Every entry point in the payload declares `@workgroup_size(8, 8, 1)`;
/// the host side only ever chooses how many workgroups to launch
/// (see [`GpuDevice::dispatch_size`]).
pub const WORKGROUP_X: u32 = 8;
pub const WORKGROUP_Y: u32 = 8;

/// Cached adapter information for logging and diagnostics.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.name, self.backend, self.device_type
        )
    }
}

/// The core GPU context: device, queue, and adapter metadata.
///
/// Create one `GpuDevice` via [`GpuDevice::new`] and keep it for the
/// lifetime of the process — it is expensive to create and every other
/// component borrows it. Dropping it releases all backend resources,
/// on error paths included.
///
/// # Field drop order
/// Rust drops struct fields in declaration order. `_instance` is declared
/// last so the `wgpu::Instance` outlives `device` and `queue`; some
/// drivers crash if the instance goes away while device-level objects
/// still hold back-references to it.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    /// Keeps the `wgpu::Instance` alive until `device` and `queue` are
    /// dropped. Never accessed directly.
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` using the first real GPU adapter found.
    ///
    /// # Errors
    /// [`FilterError::NoGpuAdapter`] when only CPU/software adapters are
    /// visible, [`FilterError::DeviceRequest`] when the driver refuses
    /// the device request.
    pub fn new() -> Result<Self, FilterError> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self, FilterError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let all_adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::PRIMARY)
            .into_iter()
            .collect();

        for a in &all_adapters {
            let info = a.get_info();
            log::debug!(
                "adapter candidate: {} ({:?}, {:?})",
                info.name,
                info.backend,
                info.device_type
            );
        }

        // First adapter that is a real GPU. `DeviceType::Cpu` (llvmpipe
        // and friends) is rejected outright — no software fallback.
        let adapter = all_adapters
            .into_iter()
            .find(|a| {
                matches!(
                    a.get_info().device_type,
                    wgpu::DeviceType::DiscreteGpu
                        | wgpu::DeviceType::IntegratedGpu
                        | wgpu::DeviceType::VirtualGpu
                )
            })
            .ok_or(FilterError::NoGpuAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        log::info!("selected adapter: {adapter_info}");

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("quadfilter"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(FilterError::DeviceRequest)?;

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            _instance: instance,
        })
    }

    /// Workgroup counts needed to cover an image of the given size with
    /// the payload's fixed 8×8 workgroups.
    ///
    /// Ceiling division: every pixel is covered even when the dimensions
    /// are not multiples of the workgroup size. The payload guards the
    /// overhang:
    /// ```wgsl
    /// if gid.x >= width || gid.y >= height { return; }
    /// ```
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        let dx = (img_w + WORKGROUP_X - 1) / WORKGROUP_X;
        let dy = (img_h + WORKGROUP_Y - 1) / WORKGROUP_Y;
        (dx, dy)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuDevice {{ adapter: {} }}", self.adapter_info)
    }
}
