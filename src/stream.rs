//! Stream cursor: slides a bit cursor packet-by-packet over one indexed
//! file, presenting the event reader with one decoded event at a time.

use crate::bitcursor::{Access, BitCursor};
use crate::codec::decode_declaration;
use crate::definition::Definitions;
use crate::error::Error;
use crate::event::{extract_event_id, extract_timestamp_sample, Event, TimestampState};
use crate::indexer::{index_packets, PacketIndexEntry};
use crate::model::{Declaration, StreamClass, StreamId, TraceType};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What `advance` re-maps its window from: a real file for directory-based
/// traces, or a caller-supplied buffer for the pre-mapped entry point
/// ([`crate::trace::open_mmap_trace`]), which never opens an `fd` at all.
enum Backing {
    File(File),
    Mapped(Arc<[u8]>),
}

/// One open stream: its backing storage, bit cursor, packet index, and
/// timestamp state. Bound to exactly one [`StreamClass`] on its first
/// packet.
pub struct FileStream {
    path: PathBuf,
    backing: Backing,
    cursor: BitCursor,
    index: Vec<PacketIndexEntry>,
    cur_index: Option<usize>,
    pub stream_id: StreamId,
    timestamps: TimestampState,
    packet_header_decl: Option<Declaration>,
    packet_context_decl: Option<Declaration>,
    /// The current packet's header+context, decoded once per packet and
    /// shared as the base scope for every event decoded from it — the
    /// same `packet_context -> stream_event_header -> ... -> payload`
    /// scope chain the original parser threads through
    /// `stream->parent_def_scope`.
    packet_scope: Definitions,
    packet_scope_root: Option<usize>,
}

impl FileStream {
    /// Opens `path`, indexes its packets against `trace_type`, and
    /// positions the cursor at the first non-empty packet's payload.
    pub fn open(path: &Path, trace_type: &TraceType) -> Result<Self, Error> {
        let result = index_packets(path, trace_type)?;
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let cursor = BitCursor::init(path, Access::Read)?;
        Self::new(
            path.to_path_buf(),
            Backing::File(file),
            cursor,
            result.entries,
            result.stream_id,
            trace_type,
        )
    }

    /// Builds a stream directly from an already-mapped buffer and an
    /// externally-supplied packet index, bypassing `index_packets`
    /// entirely — the synthetic-index bypass
    /// [`crate::trace::open_mmap_trace`] offers in place of per-file
    /// directory walking.
    pub fn from_mapped(
        data: Arc<[u8]>,
        index: Vec<PacketIndexEntry>,
        stream_id: StreamId,
        trace_type: &TraceType,
    ) -> Result<Self, Error> {
        let cursor = BitCursor::init(PathBuf::new(), Access::Read)?;
        Self::new(
            PathBuf::new(),
            Backing::Mapped(data),
            cursor,
            index,
            stream_id,
            trace_type,
        )
    }

    fn new(
        path: PathBuf,
        backing: Backing,
        cursor: BitCursor,
        index: Vec<PacketIndexEntry>,
        stream_id: StreamId,
        trace_type: &TraceType,
    ) -> Result<Self, Error> {
        let packet_context_decl = trace_type
            .streams
            .get(&stream_id)
            .and_then(|sc| sc.packet_context.clone());
        let mut stream = Self {
            path,
            backing,
            cursor,
            index,
            cur_index: None,
            stream_id,
            timestamps: TimestampState::new(),
            packet_header_decl: trace_type.packet_header.clone(),
            packet_context_decl,
            packet_scope: Definitions::new(),
            packet_scope_root: None,
        };
        stream.move_to_start()?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn move_to_start(&mut self) -> Result<(), Error> {
        self.cur_index = None;
        self.advance()
    }

    /// Slides the mapping to the next packet (or the first, from the
    /// idle state), re-decoding nothing beyond positioning `bit_offset`
    /// at `data_offset`. Empty packets (`data_offset == content_size`)
    /// are skipped transparently by recursing once more.
    pub fn advance(&mut self) -> Result<(), Error> {
        self.cursor.unmap();
        let next = match self.cur_index {
            None => 0,
            Some(i) => i + 1,
        };
        if next >= self.index.len() {
            self.cur_index = Some(next);
            self.cursor.bit_offset = None;
            return Ok(());
        }
        let entry = &self.index[next];
        match &self.backing {
            Backing::File(file) => {
                self.cursor.remap(
                    file,
                    entry.offset_bytes * 8,
                    entry.content_size_bits,
                    entry.packet_size_bits,
                )?;
            }
            Backing::Mapped(data) => {
                self.cursor.remap_shared(
                    data.clone(),
                    entry.offset_bytes as usize,
                    entry.content_size_bits,
                    entry.packet_size_bits,
                )?;
            }
        }
        let data_offset_bits = entry.data_offset_bits;
        let content_size_bits = entry.content_size_bits;
        let packet_size_bits = entry.packet_size_bits;
        self.cursor.bit_offset = Some(data_offset_bits);
        self.cur_index = Some(next);
        self.decode_packet_scope(content_size_bits, packet_size_bits)?;

        if data_offset_bits == content_size_bits {
            // Empty packet: nothing to read here, move on immediately.
            return self.advance();
        }
        Ok(())
    }

    /// Re-decodes the current packet's header and context from bit 0 into
    /// `packet_scope`, chaining context under header, so later event-scope
    /// decodes can resolve variant tags and sequence lengths declared at
    /// the packet level. Uses a detached cursor so the caller's `cursor`
    /// (already positioned at the payload) is left untouched.
    fn decode_packet_scope(&mut self, content_size_bits: usize, packet_size_bits: usize) -> Result<(), Error> {
        self.packet_scope = Definitions::new();
        self.packet_scope_root = None;
        if self.packet_header_decl.is_none() && self.packet_context_decl.is_none() {
            return Ok(());
        }
        let data = self
            .cursor
            .bytes()
            .expect("packet mapped after remap")
            .to_vec();
        let mut probe = BitCursor::detached(content_size_bits, packet_size_bits);
        let mut parent = None;
        if let Some(decl) = &self.packet_header_decl {
            parent = Some(decode_declaration(&mut self.packet_scope, &data, &mut probe, "packet_header", None, decl)?);
        }
        if let Some(decl) = &self.packet_context_decl {
            parent = Some(decode_declaration(&mut self.packet_scope, &data, &mut probe, "packet_context", parent, decl)?);
        }
        self.packet_scope_root = parent;
        Ok(())
    }

    pub fn is_eof(&self) -> bool {
        match self.cur_index {
            None => false,
            Some(i) => i >= self.index.len(),
        }
    }

    fn current_entry(&self) -> Option<&PacketIndexEntry> {
        self.cur_index.and_then(|i| self.index.get(i))
    }

    /// Reads one event from the current packet, advancing to the next
    /// packet when this one is exhausted. Returns `Ok(None)` at the end
    /// of the stream.
    pub fn read_event(&mut self, stream_class: &StreamClass) -> Result<Option<Event>, Error> {
        loop {
            if self.is_eof() {
                return Ok(None);
            }
            let entry = self.current_entry().expect("checked not eof").clone();
            if self.cursor.bit_offset == Some(entry.content_size_bits) {
                // Consumed exactly the payload; move to the next packet.
                self.advance()?;
                continue;
            }
            return self.decode_one_event(stream_class).map(Some);
        }
    }

    /// Decodes one event's header/context/payload into the shared
    /// `packet_scope` arena, each scope chained as the parent of the next
    /// exactly as `packet_context -> stream_event_header ->
    /// stream_event_context -> event_context -> event_fields` chains in
    /// the original. A variant tag or sequence length declared in any
    /// earlier scope (including the packet context) is therefore visible
    /// to every later one.
    fn decode_one_event(&mut self, stream_class: &StreamClass) -> Result<Event, Error> {
        let data = self
            .cursor
            .bytes()
            .expect("packet mapped while not eof")
            .to_vec();

        let mut defs = self.packet_scope.clone();
        let mut parent = self.packet_scope_root;

        let header_root = if let Some(decl) = &stream_class.event_header {
            self.cursor.align(decl.alignment());
            let root = decode_declaration(&mut defs, &data, &mut self.cursor, "stream_event_header", parent, decl)?;
            parent = Some(root);
            Some(root)
        } else {
            None
        };
        let header_value = header_root.map(|root| defs.to_value(root));

        let id = extract_event_id(header_value.as_ref());
        let timestamp = extract_timestamp_sample(header_value.as_ref(), stream_class.event_header.as_ref())
            .map(|(sample, width)| self.timestamps.update(sample, width));

        let stream_event_context = if let Some(decl) = &stream_class.event_context {
            self.cursor.align(decl.alignment());
            let root = decode_declaration(&mut defs, &data, &mut self.cursor, "stream_event_context", parent, decl)?;
            parent = Some(root);
            Some(defs.to_value(root))
        } else {
            None
        };

        let event_class = stream_class
            .events
            .get(&id)
            .ok_or(Error::UndefinedEventId(id))?;

        let event_context = if let Some(decl) = &event_class.context {
            self.cursor.align(decl.alignment());
            let root = decode_declaration(&mut defs, &data, &mut self.cursor, "event_context", parent, decl)?;
            parent = Some(root);
            Some(defs.to_value(root))
        } else {
            None
        };

        let payload = if let Some(decl) = &event_class.payload {
            self.cursor.align(decl.alignment());
            let root = decode_declaration(&mut defs, &data, &mut self.cursor, "payload", parent, decl)?;
            Some(defs.to_value(root))
        } else {
            None
        };

        Ok(Event {
            id,
            timestamp,
            stream_event_context,
            event_context,
            payload,
        })
    }
}
