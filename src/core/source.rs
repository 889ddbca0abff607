use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use failure::Error;

use crate::core::error::DecodeError;

/// Where the raw bytes of a file come from. Construct with `.into()` on a
/// `Path` (not available on `wasm32`) or an owned buffer. The decoder only
/// ever asks for complete ranges; partial buffers are never handed on.
#[derive(Debug, Clone)]
pub struct Source(SourceInner);

#[derive(Debug, Clone)]
enum SourceInner {
    /// A file on disc.
    Local(PathBuf),
    /// An in-memory copy of the file.
    InMem(Arc<Vec<u8>>),
}

impl Source {
    pub fn new<T: Into<Self>>(thing: T) -> Self {
        thing.into()
    }

    /// Fetch exactly `len` bytes starting at `start`. Under-delivery is a
    /// [`DecodeError::ShortRead`].
    pub fn fetch(&self, start: u64, len: u64) -> Result<Vec<u8>, Error> {
        match &self.0 {
            SourceInner::Local(path) => {
                let mut f = File::open(path)?;
                f.seek(SeekFrom::Start(start))?;
                let mut buf = vec![0; len as usize];
                f.read_exact(&mut buf).map_err(|_| DecodeError::ShortRead {
                    offset: start,
                    wanted: len,
                })?;
                Ok(buf)
            }
            SourceInner::InMem(data) => {
                let end = start
                    .checked_add(len)
                    .filter(|end| *end <= data.len() as u64)
                    .ok_or(DecodeError::ShortRead {
                        offset: start,
                        wanted: len,
                    })?;
                Ok(data[start as usize..end as usize].to_vec())
            }
        }
    }
}

// Disallow the construction of a local source object on wasm since wasm does
// not have a (proper) file system.
#[cfg(not(target_arch = "wasm32"))]
impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        path.to_path_buf().into()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<PathBuf> for Source {
    fn from(path_buf: PathBuf) -> Self {
        Self(SourceInner::Local(path_buf))
    }
}

impl From<Vec<u8>> for Source {
    fn from(buf: Vec<u8>) -> Self {
        Self(SourceInner::InMem(Arc::new(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_mem_fetch_is_exact() {
        let src = Source::new(vec![1u8, 2, 3, 4, 5]);
        assert_eq!(src.fetch(1, 3).unwrap(), vec![2, 3, 4]);
        let err = src.fetch(3, 4).unwrap_err();
        assert_eq!(
            err.downcast::<DecodeError>().unwrap(),
            DecodeError::ShortRead { offset: 3, wanted: 4 }
        );
    }
}
