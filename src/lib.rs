// quadfilter — GPU still-image filter pipeline.
//
// Runs a fixed sequence of four compute filters (gaussian smoothing,
// bilateral, sharpen, median) over one still image and reads each result
// back to the host. The filter kernels themselves are an external WGSL
// payload with a fixed entry-point contract (see `program::Filter`);
// this crate owns device acquisition, payload compilation, host/device
// image transfer, argument binding, dispatch, and read-back.

pub mod coeffs;
pub mod device;
pub mod error;
pub mod filters;
pub mod image;
pub mod program;

pub use error::FilterError;
