// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # IFF FORM containers
//!
//! The outer layer of a Quetzal save file is an IFF `FORM` group: the
//! literal bytes `FORM`, a 32-bit big-endian length, a four-character
//! sub-identifier, and then a sequence of chunks. Each chunk is a
//! four-character type, a 32-bit big-endian payload length, the payload
//! bytes, and one padding byte when the payload length is odd.
//!
//! ```text
//! "FORM" [len u32] [sub-id 4cc]
//!     [type 4cc] [len u32] [bytes...] (pad)
//!     [type 4cc] [len u32] [bytes...] (pad)
//!     ...
//! ```
//!
//! This crate provides the container plumbing only; chunk payloads are
//! opaque byte slices.


/// Pack a four-character code into its 32-bit big-endian identifier.
#[inline]
#[must_use]
pub const fn fourcc(id: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*id)
}

/// Unpack a 32-bit identifier back into its four characters.
#[inline]
#[must_use]
pub const fn fourcc_bytes(id: u32) -> [u8; 4] {
    id.to_be_bytes()
}

/// Well-known identifiers.
pub mod ids {
    use super::fourcc;

    /// Outer group type.
    pub const FORM: u32 = fourcc(b"FORM");
    /// Quetzal sub-identifier.
    pub const IFZS: u32 = fourcc(b"IFZS");
    /// Story-file identification chunk.
    pub const IFHD: u32 = fourcc(b"IFhd");
    /// Compressed (XOR/RLE) memory chunk.
    pub const CMEM: u32 = fourcc(b"CMem");
    /// Uncompressed memory chunk.
    pub const UMEM: u32 = fourcc(b"UMem");
    /// Stack chunk.
    pub const STKS: u32 = fourcc(b"Stks");
    /// Heap allocator state chunk.
    pub const MALL: u32 = fourcc(b"MAll");
}

/// Error while parsing a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// The buffer is shorter than the 12-byte group header.
    TooShort,
    /// The group type is not `FORM`.
    NotAForm(u32),
    /// The declared group length runs past the end of the buffer.
    GroupTruncated {
        /// Length declared in the group header.
        declared: u32,
        /// Bytes actually available after the header.
        available: usize,
    },
    /// A chunk header or payload runs past the end of the group.
    ChunkTruncated {
        /// Type of the offending chunk (0 if the header itself is cut).
        chunk_type: u32,
    },
}

impl core::fmt::Display for FormError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooShort => write!(f, "buffer too short for a FORM header"),
            Self::NotAForm(t) => {
                let b = fourcc_bytes(*t);
                write!(f, "not a FORM group: found {:?}", b.escape_ascii().to_string())
            }
            Self::GroupTruncated {
                declared,
                available,
            } => write!(
                f,
                "FORM length {declared} exceeds the {available} bytes available"
            ),
            Self::ChunkTruncated { chunk_type } => {
                let b = fourcc_bytes(*chunk_type);
                write!(f, "chunk {:?} truncated", b.escape_ascii().to_string())
            }
        }
    }
}

impl std::error::Error for FormError {}

/// One chunk inside a parsed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Four-character chunk type.
    pub chunk_type: u32,
    /// Payload bytes (padding excluded).
    pub data: &'a [u8],
}

/// Parsed view over a `FORM` container.
///
/// Borrows the underlying buffer; chunks are parsed eagerly so that a
/// malformed file is rejected in one place.
#[derive(Debug)]
pub struct FormReader<'a> {
    sub_id: u32,
    chunks: Vec<Chunk<'a>>,
}

impl<'a> FormReader<'a> {
    /// Parse a form from a byte buffer.
    ///
    /// # Errors
    ///
    /// Returns `FormError` if the buffer is not a well-formed `FORM`
    /// group or any chunk is truncated.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FormError> {
        if bytes.len() < 12 {
            return Err(FormError::TooShort);
        }

        let group_type = read_u32(bytes, 0);
        if group_type != ids::FORM {
            return Err(FormError::NotAForm(group_type));
        }

        // The group length counts everything after its own field,
        // including the sub-identifier.
        let declared = read_u32(bytes, 4);
        let available = bytes.len() - 8;
        if (declared as usize) > available || declared < 4 {
            return Err(FormError::GroupTruncated {
                declared,
                available,
            });
        }

        let sub_id = read_u32(bytes, 8);
        let mut chunks = Vec::new();
        let end = 8 + declared as usize;
        let mut pos = 12;

        while pos < end {
            if pos + 8 > end {
                return Err(FormError::ChunkTruncated { chunk_type: 0 });
            }
            let chunk_type = read_u32(bytes, pos);
            let len = read_u32(bytes, pos + 4) as usize;
            pos += 8;

            if pos + len > end {
                return Err(FormError::ChunkTruncated { chunk_type });
            }
            chunks.push(Chunk {
                chunk_type,
                data: &bytes[pos..pos + len],
            });
            pos += len;

            // Odd-length payloads are followed by one padding byte.
            if len % 2 == 1 && pos < end {
                pos += 1;
            }
        }

        Ok(Self { sub_id, chunks })
    }

    /// The four-character sub-identifier of the group.
    #[must_use]
    pub const fn sub_id(&self) -> u32 {
        self.sub_id
    }

    /// All chunks in file order.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk<'a>] {
        &self.chunks
    }

    /// First chunk of the given type, if present.
    #[must_use]
    pub fn find(&self, chunk_type: u32) -> Option<&Chunk<'a>> {
        self.chunks.iter().find(|c| c.chunk_type == chunk_type)
    }
}

/// Incremental `FORM` builder.
///
/// Chunks are appended with [`FormWriter::chunk`]; [`FormWriter::finish`]
/// patches the group length and returns the finished byte buffer.
#[derive(Debug)]
pub struct FormWriter {
    buf: Vec<u8>,
}

impl FormWriter {
    /// Start a form with the given sub-identifier.
    #[must_use]
    pub fn new(sub_id: u32) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&ids::FORM.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes()); // patched in finish()
        buf.extend_from_slice(&sub_id.to_be_bytes());
        Self { buf }
    }

    /// Append one chunk, padding to an even length.
    pub fn chunk(&mut self, chunk_type: u32, data: &[u8]) {
        self.buf.extend_from_slice(&chunk_type.to_be_bytes());
        self.buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(data);
        if data.len() % 2 == 1 {
            self.buf.push(0);
        }
    }

    /// Patch the group length and return the serialized form.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        let group_len = (self.buf.len() - 8) as u32;
        self.buf[4..8].copy_from_slice(&group_len.to_be_bytes());
        self.buf
    }
}

#[inline]
fn read_u32(bytes: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}
