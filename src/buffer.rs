//! Fixed-length binary buffers and in-memory files.

use crate::mime;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("starting index and length are too big ({start} + {length} > {available})")]
    OutOfRange {
        start: usize,
        length: usize,
        available: usize,
    },
    #[error("the output buffer is too small ({needed} bytes needed, {available} available)")]
    DestinationTooSmall { needed: usize, available: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An immutable-length sequence of bytes.
///
/// The backing storage is shared, so cloning a buffer is cheap and the length
/// can never change after construction. All partial reads and writes are
/// bounds-checked against the buffer and the destination.
#[derive(Debug, Clone)]
pub struct Buffer {
    bytes: Arc<[u8]>,
}

impl Buffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Drains a readable source into a new buffer.
    ///
    /// Reads exactly `length` bytes when given, or the full remainder of the
    /// source otherwise. The source is consumed either way; ownership of the
    /// read position transfers here and the source is dropped on return.
    pub fn from_reader<R: Read>(mut reader: R, length: Option<usize>) -> Result<Self, BufferError> {
        let bytes = match length {
            Some(len) => {
                let mut bytes = vec![0u8; len];
                reader.read_exact(&mut bytes)?;
                bytes
            }
            None => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                bytes
            }
        };
        Ok(Self::new(bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    // Resolves a (start, length) request against the buffer, where a missing
    // length means "the remainder".
    fn span(&self, start: usize, length: Option<usize>) -> Result<&[u8], BufferError> {
        let length = match length {
            Some(length) => length,
            None => self.len().checked_sub(start).ok_or(BufferError::OutOfRange {
                start,
                length: 0,
                available: self.len(),
            })?,
        };
        let end = start.checked_add(length).filter(|&end| end <= self.len()).ok_or(
            BufferError::OutOfRange {
                start,
                length,
                available: self.len(),
            },
        )?;
        Ok(&self.bytes[start..end])
    }

    /// Writes a bounds-checked slice of the buffer to an async stream.
    pub async fn write_to<W>(
        &self,
        stream: &mut W,
        start: usize,
        length: Option<usize>,
    ) -> Result<(), BufferError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let span = self.span(start, length)?;
        stream.write_all(span).await?;
        Ok(())
    }

    /// Copies a bounds-checked slice of the buffer into a byte array.
    pub fn copy_to(
        &self,
        target: &mut [u8],
        start_from: usize,
        start_dest: usize,
        length: Option<usize>,
    ) -> Result<(), BufferError> {
        let span = self.span(start_from, length)?;
        let needed = start_dest
            .checked_add(span.len())
            .ok_or(BufferError::DestinationTooSmall {
                needed: usize::MAX,
                available: target.len(),
            })?;
        if target.len() < needed {
            return Err(BufferError::DestinationTooSmall {
                needed,
                available: target.len(),
            });
        }
        target[start_dest..needed].copy_from_slice(span);
        Ok(())
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// A file held in memory: contents plus a resolved MIME type.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub content: Buffer,
    pub mime: String,
}

impl MemoryFile {
    /// Builds a memory file, resolving the MIME type from a hint.
    ///
    /// An empty hint defaults to `application/octet-stream`; a dot-prefixed
    /// extension or a known table key resolves directly; anything else is
    /// treated as a file name and resolved by its extension.
    pub fn new(content: Buffer, name_or_mime: &str) -> Self {
        let hint = name_or_mime.trim();
        let mime = if hint.is_empty() {
            mime::mime_of(".bin")
        } else if hint.starts_with('.') || mime::is_known_ext(hint) {
            mime::mime_of(hint)
        } else {
            mime::mime_of(&mime::web_ext(hint))
        };
        Self {
            content,
            mime: mime.to_string(),
        }
    }
}
