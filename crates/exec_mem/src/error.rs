use std::fmt;

use errno::Errno;

pub type Result<T> = std::result::Result<T, MappingError>;

/// Any error raised while mapping or reprotecting memory.
#[derive(Debug, Clone)]
pub enum MappingError {
    Internal(Errno),
}

impl From<Errno> for MappingError {
    fn from(e: Errno) -> Self {
        MappingError::Internal(e)
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MappingError::Internal(errno) => write!(f, "mmap error: {}", errno),
        }
    }
}

impl std::error::Error for MappingError {}
