use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;

use errno::errno;

use crate::{ExecutableRegion, MappedRegion};

/// A mapped region that may be read and written, but not executed.
///
/// This is the only stage at which code may be copied into the region; sealing
/// it with [WritableRegion::into_executable] revokes write access for good.
pub struct WritableRegion {
    region: MappedRegion,
}

impl WritableRegion {
    /// Allocates a fresh region of the given size, already writable.
    pub fn allocate(size: usize) -> crate::Result<Self> {
        MappedRegion::allocate(size)?.into_writable()
    }

    pub(crate) fn from(region: MappedRegion) -> crate::Result<Self> {
        use libc::{PROT_READ, PROT_WRITE};

        unsafe {
            if libc::mprotect(region.addr_mut(), region.len(), PROT_READ | PROT_WRITE) < 0 {
                return Err(errno().into());
            }
        }

        Ok(Self { region })
    }

    /// Seals the region: read-only and executable from here on.
    pub fn into_executable(self) -> crate::Result<ExecutableRegion> {
        ExecutableRegion::from(self.region)
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    fn as_slice(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(self.region.addr() as *const u8, self.region.len())
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.region.addr_mut() as *mut u8, self.region.len())
        }
    }
}

impl<I> Index<I> for WritableRegion
where
    I: SliceIndex<[u8]>,
{
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl<I> IndexMut<I> for WritableRegion
where
    I: SliceIndex<[u8]>,
{
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        &mut self.as_mut_slice()[index]
    }
}
