//! Memory-mapped regions for runtime code generation.
//!
//! Generated machine code goes through a strict write-then-seal lifecycle:
//! allocate a [MappedRegion], upgrade it to a [WritableRegion], copy the code
//! in, then seal it into an [ExecutableRegion]. A sealed region can never be
//! written to again — each stage consumes the previous one, so the type system
//! rules out self-modifying code after sealing. Unmapping happens on drop, on
//! every path.

extern crate errno;
extern crate libc;

mod error;
mod executable_region;
mod mapped_region;
mod writable_region;

pub use crate::error::{MappingError, Result};
pub use crate::executable_region::ExecutableRegion;
pub use crate::mapped_region::MappedRegion;
pub use crate::writable_region::WritableRegion;

/// Reinterprets an [ExecutableRegion] as a callable function of the given
/// type.
///
/// # Safety
///
/// Calling the result executes whatever bytes were written to the region; the
/// caller must guarantee they form a valid function with the stated signature
/// and calling convention.
#[macro_export]
macro_rules! as_function {
    ($region:expr, $fn_type:ty) => {
        std::mem::transmute::<*const u8, $fn_type>($region.addr())
    };
}
