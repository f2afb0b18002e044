use errno::errno;

use crate::MappedRegion;

/// A sealed region of executable memory. Use [as_function!] to call into it.
pub struct ExecutableRegion {
    region: MappedRegion,
}

impl ExecutableRegion {
    pub(crate) fn from(region: MappedRegion) -> crate::Result<Self> {
        use libc::{PROT_EXEC, PROT_READ};

        unsafe {
            if libc::mprotect(region.addr_mut(), region.len(), PROT_READ | PROT_EXEC) < 0 {
                return Err(errno().into());
            }
        }

        Ok(Self { region })
    }

    /// Returns the address of the first byte of code.
    pub fn addr(&self) -> *const u8 {
        self.region.addr() as *const u8
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }
}
