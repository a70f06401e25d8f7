//! Bit-granular cursor over a memory-mapped packet.
//!
//! A [`BitCursor`] owns at most one live mapping window at a time, either
//! a real [`memmap2::Mmap`] over a file-backed stream or a byte range
//! sliced out of an already-mapped buffer supplied by
//! [`crate::trace::open_mmap_trace`]. It never re-derives a raw pointer
//! into the mapping for callers: reads go through `read_bits`, which
//! takes the mapping's byte slice directly, so there's no
//! `content_size_loc`-style pinned pointer to manage (see DESIGN.md on
//! the write-mode stub).

use crate::error::Error;
use crate::model::ByteOrder;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read or write access mode. Write is accepted by the type so a future
/// writer crate can occupy this shape without an API break, but every
/// write-mode operation on a [`BitCursor`] returns
/// [`Error::WriteUnsupported`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Access {
    Read,
    Write,
}

enum Mapping {
    File(Mmap),
    /// A byte range sliced out of an externally-supplied buffer, used by
    /// the pre-mapped stream path (`open_mmap_trace`), which bypasses
    /// this crate calling `mmap` itself.
    Shared { data: Arc<[u8]>, offset: usize, len: usize },
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::File(m) => &m[..],
            Mapping::Shared { data, offset, len } => &data[*offset..*offset + *len],
        }
    }
}

/// A bit cursor's idle, unmapped state keeps no mapping; `bit_offset` of
/// `None` is the EOF sentinel the rest of the crate treats idiomatically
/// as `Option::None` rather than a magic constant.
pub struct BitCursor {
    path: PathBuf,
    access: Access,
    mapping: Option<Mapping>,
    /// Bit offset of the mapping's start within the file.
    mmap_file_offset: u64,
    /// Bits, not including the padding beyond `content_size`.
    pub content_size: usize,
    /// Bits, including padding; the mapping always covers exactly this
    /// many bits (rounded up to bytes).
    pub packet_size: usize,
    /// Current read position in bits from the start of the mapping.
    /// `None` means the cursor is exhausted (EOF).
    pub bit_offset: Option<usize>,
}

impl BitCursor {
    pub fn init(path: impl Into<PathBuf>, access: Access) -> Result<Self, Error> {
        if access == Access::Write {
            return Err(Error::WriteUnsupported);
        }
        Ok(Self {
            path: path.into(),
            access,
            mapping: None,
            mmap_file_offset: 0,
            content_size: 0,
            packet_size: 0,
            bit_offset: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_eof(&self) -> bool {
        self.bit_offset.is_none()
    }

    /// Releases the current mapping, if any.
    pub fn unmap(&mut self) {
        self.mapping = None;
    }

    /// Maps exactly `packet_size_bits / 8` bytes (rounded up) at
    /// `file_offset_bits`, replacing any previous mapping.
    pub fn remap(
        &mut self,
        file: &File,
        file_offset_bits: u64,
        content_size_bits: usize,
        packet_size_bits: usize,
    ) -> Result<(), Error> {
        if self.access == Access::Write {
            return Err(Error::WriteUnsupported);
        }
        let byte_offset = file_offset_bits / 8;
        let byte_len = packet_size_bits.div_ceil(8);
        tracing::trace!(
            path = %self.path.display(),
            byte_offset,
            byte_len,
            content_size_bits,
            "remapping packet window"
        );
        // SAFETY: the mapped file is not concurrently truncated by this
        // process; CTF trace files are read-only inputs for the lifetime
        // of the trace handle.
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .offset(byte_offset)
                .len(byte_len)
                .map(file)
        }
        .map_err(|e| Error::mmap(self.path.clone(), e))?;
        self.mapping = Some(Mapping::File(mmap));
        self.mmap_file_offset = file_offset_bits;
        self.content_size = content_size_bits;
        self.packet_size = packet_size_bits;
        self.bit_offset = Some(0);
        Ok(())
    }

    /// Slices exactly `packet_size_bits / 8` bytes (rounded up) out of an
    /// already-mapped buffer at `byte_offset`, replacing any previous
    /// mapping. Used by the pre-mapped stream path, where the caller
    /// supplied the mapping and this crate only windows over it.
    pub fn remap_shared(
        &mut self,
        data: Arc<[u8]>,
        byte_offset: usize,
        content_size_bits: usize,
        packet_size_bits: usize,
    ) -> Result<(), Error> {
        if self.access == Access::Write {
            return Err(Error::WriteUnsupported);
        }
        let byte_len = packet_size_bits.div_ceil(8);
        if byte_offset + byte_len > data.len() {
            return Err(Error::SizeInvariant(format!(
                "mapped stream has {} bytes, too short for a packet of {byte_len} bytes at offset {byte_offset}",
                data.len()
            )));
        }
        self.mapping = Some(Mapping::Shared {
            data,
            offset: byte_offset,
            len: byte_len,
        });
        self.mmap_file_offset = (byte_offset * 8) as u64;
        self.content_size = content_size_bits;
        self.packet_size = packet_size_bits;
        self.bit_offset = Some(0);
        Ok(())
    }

    pub fn mmap_file_offset(&self) -> u64 {
        self.mmap_file_offset
    }

    /// The mapped bytes, or `None` if nothing is currently mapped.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.mapping.as_ref().map(Mapping::bytes)
    }

    /// Aligns the cursor's bit offset up to `alignment` bits, as required
    /// before reading a new top-level scope (event header, event context,
    /// payload).
    pub fn align(&mut self, alignment: u32) {
        if let Some(off) = self.bit_offset {
            let a = alignment.max(1) as usize;
            let aligned = off.div_ceil(a) * a;
            self.bit_offset = Some(aligned);
        }
    }

    /// Advances the cursor by `bits`.
    pub fn advance(&mut self, bits: usize) {
        if let Some(off) = self.bit_offset {
            self.bit_offset = Some(off + bits);
        }
    }

    pub fn remaining_content_bits(&self) -> usize {
        self.bit_offset
            .map(|off| self.content_size.saturating_sub(off))
            .unwrap_or(0)
    }

    /// Builds a cursor with no backing mapping, positioned at bit 0 of a
    /// `content_bits`/`packet_bits`-sized region. Used to re-decode
    /// already-mapped bytes from a fresh bit offset without disturbing
    /// another cursor's own position — e.g. re-reading a packet's header
    /// and context to extend the scope chain for event decoding — and by
    /// tests that exercise `decode_declaration` without a real file, since
    /// the codec takes mapped bytes as a plain slice argument rather than
    /// through `bytes()`.
    pub(crate) fn detached(content_bits: usize, packet_bits: usize) -> Self {
        Self {
            path: PathBuf::new(),
            access: Access::Read,
            mapping: None,
            mmap_file_offset: 0,
            content_size: content_bits,
            packet_size: packet_bits,
            bit_offset: Some(0),
        }
    }
}

/// Reads `len` bits starting at `start_bit` from `data` in the given byte
/// order, returning them right-justified in a `u64`. `len` must be in
/// `1..=64`.
pub fn read_bits(data: &[u8], start_bit: usize, len: usize, byte_order: ByteOrder) -> u64 {
    debug_assert!(len >= 1 && len <= 64);
    match byte_order {
        ByteOrder::Big => read_bits_be(data, start_bit, len),
        ByteOrder::Little => read_bits_le(data, start_bit, len),
    }
}

fn read_bits_be(data: &[u8], start_bit: usize, len: usize) -> u64 {
    let mut result: u64 = 0;
    for i in 0..len {
        let bit_index = start_bit + i;
        let byte = data[bit_index / 8];
        let bit = (byte >> (7 - (bit_index % 8))) & 1;
        result = (result << 1) | bit as u64;
    }
    result
}

fn read_bits_le(data: &[u8], start_bit: usize, len: usize) -> u64 {
    let mut result: u64 = 0;
    for i in 0..len {
        let bit_index = start_bit + i;
        let byte = data[bit_index / 8];
        let bit = (byte >> (bit_index % 8)) & 1;
        result |= (bit as u64) << i;
    }
    result
}

/// Sign-extends the low `len` bits of `v` into a signed 64-bit value.
pub fn sign_extend(v: u64, len: u32) -> i64 {
    if len == 64 {
        return v as i64;
    }
    let shift = 64 - len;
    ((v << shift) as i64) >> shift
}
