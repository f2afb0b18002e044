use std::ops::Drop;
use std::ptr;

use errno::errno;
use libc::{c_int, c_void, size_t};

use crate::WritableRegion;

#[cfg(target_os = "macos")]
const MAP_FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_JIT;
#[cfg(not(target_os = "macos"))]
const MAP_FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

/// A page-aligned region of memory obtained from `mmap(2)`.
///
/// The region starts with no access permissions at all; upgrade it with
/// [MappedRegion::into_writable]. `munmap(2)` runs when the value is dropped.
pub struct MappedRegion {
    addr: *mut c_void,
    len: size_t,
}

impl MappedRegion {
    /// Allocate a region of the given size (in bytes).
    pub fn allocate(size: usize) -> crate::Result<Self> {
        let memory = unsafe {
            libc::mmap(ptr::null_mut(), size, libc::PROT_NONE, MAP_FLAGS, -1, 0)
        };

        if memory == libc::MAP_FAILED {
            return Err(errno().into());
        }

        Ok(MappedRegion {
            addr: memory,
            len: size,
        })
    }

    /// Returns a pointer to the start of the region.
    pub fn addr(&self) -> *const c_void {
        self.addr
    }

    pub(crate) fn addr_mut(&self) -> *mut c_void {
        self.addr
    }

    /// Returns the length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consumes the region and makes it readable and writable.
    pub fn into_writable(self) -> crate::Result<WritableRegion> {
        WritableRegion::from(self)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr, self.len);
        }
        self.addr = ptr::null_mut();
        self.len = 0;
    }
}
