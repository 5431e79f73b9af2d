use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;

/// Where the bytes of a [`SourceFile`] come from.
#[derive(Debug, Clone)]
enum SourceOrigin {
    /// A file on local disk, opened per chunk read.
    Disk(PathBuf),
    /// A buffer already held in memory.
    Memory(Arc<[u8]>),
}

/// The file being uploaded: a name, a size and a way to slice byte ranges.
///
/// Only one chunk is read into memory at a time; disk sources reopen the
/// file for every slice so no handle is held between chunks.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    size: u64,
    origin: SourceOrigin,
}

impl SourceFile {
    /// Opens a disk file, taking its name from the last path component.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self {
            name,
            size: meta.len(),
            origin: SourceOrigin::Disk(path.to_path_buf()),
        })
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            origin: SourceOrigin::Memory(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads exactly the bytes in `range`.
    pub async fn read_chunk(&self, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
        if range.start > range.end || range.end > self.size {
            return Err(TransferError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                size: self.size,
            });
        }
        let len = (range.end - range.start) as usize;

        match &self.origin {
            SourceOrigin::Memory(data) => {
                Ok(data[range.start as usize..range.end as usize].to_vec())
            }
            SourceOrigin::Disk(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(range.start)).await?;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf).await?;
                Ok(buf)
            }
        }
    }
}
