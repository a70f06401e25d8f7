//! Packet indexer: walks one stream file packet-by-packet, decoding just
//! the packet header and packet context of each packet to build the file
//! stream's packet index, without holding more than one packet's worth of
//! mapping alive at a time.

use crate::bitcursor::{Access, BitCursor};
use crate::codec::decode_declaration;
use crate::definition::Definitions;
use crate::error::Error;
use crate::model::{StreamClass, StreamId, Timestamp, TraceType, CTF_MAGIC};
use std::fs::File;
use std::path::Path;
use uuid::Uuid;

/// Bits mapped while probing a packet's header/context before its true
/// `packet_size` is known.
pub const MAX_PACKET_HEADER_LEN: usize = 4096;

#[derive(Clone, Debug)]
pub struct PacketIndexEntry {
    pub offset_bytes: u64,
    pub packet_size_bits: usize,
    pub content_size_bits: usize,
    pub data_offset_bits: usize,
    pub timestamp_begin: Option<Timestamp>,
    pub timestamp_end: Option<Timestamp>,
}

pub struct IndexResult {
    pub entries: Vec<PacketIndexEntry>,
    pub stream_id: StreamId,
}

/// Walks every packet in `path`, validating headers against `trace_type`.
/// Returns the populated index and the stream id bound on the first
/// packet. A packet-indexing error aborts indexing of the whole file —
/// the caller's `open_trace` fails.
pub fn index_packets(path: &Path, trace_type: &TraceType) -> Result<IndexResult, Error> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| Error::io(path, e))?
        .len();

    if file_size < (MAX_PACKET_HEADER_LEN / 8) as u64 {
        return Err(Error::FileTooSmall {
            path: path.to_path_buf(),
        });
    }

    let mut entries = Vec::new();
    let mut stream_id: Option<StreamId> = None;
    let mut stream_class: Option<&StreamClass> = None;
    let mut offset = 0u64;

    let mut cursor = BitCursor::init(path, Access::Read)?;

    while offset < file_size {
        let probe_bits = MAX_PACKET_HEADER_LEN.min(((file_size - offset) * 8) as usize);
        cursor.remap(&file, offset * 8, probe_bits, probe_bits)?;
        let data = cursor.bytes().expect("just remapped").to_vec();

        let mut header_defs = Definitions::new();
        let mut packet_stream_id = stream_id;
        let mut header_root: Option<usize> = None;

        if let Some(header_decl) = &trace_type.packet_header {
            let root = decode_declaration(&mut header_defs, &data, &mut cursor, "packet_header", None, header_decl)?;
            header_root = Some(root);
            let header_value = header_defs.to_value(root);

            if let Some(magic) = header_value.field("magic").and_then(|v| v.as_u64()) {
                if magic as u32 != CTF_MAGIC {
                    return Err(Error::BadMagic {
                        found: magic as u32,
                        expected: CTF_MAGIC,
                    });
                }
            }
            if let Some(uuid_field) = header_value.field("uuid") {
                if let Some(trace_uuid) = &trace_type.uuid {
                    if !uuid_field_matches(uuid_field, trace_uuid) {
                        return Err(Error::UuidMismatch);
                    }
                }
            }
            if let Some(sid) = header_value.field("stream_id").and_then(|v| v.as_u64()) {
                packet_stream_id = Some(sid);
            }
        }

        match (stream_id, packet_stream_id) {
            (None, Some(sid)) => {
                stream_id = Some(sid);
                stream_class = trace_type.streams.get(&sid);
                if stream_class.is_none() {
                    return Err(Error::UndefinedStreamId(sid));
                }
            }
            (Some(prev), Some(found)) if prev != found => {
                return Err(Error::StreamIdChanged { previous: prev, found });
            }
            _ => {}
        }

        let mut content_size_bits: usize;
        let mut packet_size_bits: usize;
        let mut timestamp_begin = None;
        let mut timestamp_end = None;

        content_size_bits = file_size as usize * 8;
        packet_size_bits = content_size_bits;

        if let Some(sc) = stream_class {
            if let Some(pctx_decl) = &sc.packet_context {
                let root = decode_declaration(&mut header_defs, &data, &mut cursor, "packet_context", header_root, pctx_decl)?;
                let ctx_value = header_defs.to_value(root);
                if let Some(v) = ctx_value.field("content_size").and_then(|v| v.as_u64()) {
                    content_size_bits = v as usize;
                }
                if let Some(v) = ctx_value.field("packet_size").and_then(|v| v.as_u64()) {
                    packet_size_bits = v as usize;
                } else if content_size_bits != 0 {
                    packet_size_bits = content_size_bits;
                }
                timestamp_begin = ctx_value.field("timestamp_begin").and_then(|v| v.as_u64());
                timestamp_end = ctx_value.field("timestamp_end").and_then(|v| v.as_u64());
            }
        }

        if content_size_bits > packet_size_bits {
            return Err(Error::SizeInvariant(format!(
                "content_size ({content_size_bits}) exceeds packet_size ({packet_size_bits})"
            )));
        }
        if packet_size_bits > ((file_size - offset) * 8) as usize {
            return Err(Error::SizeInvariant(format!(
                "packet_size ({packet_size_bits}) exceeds remaining file bits"
            )));
        }

        let data_offset_bits = cursor.bit_offset.unwrap_or(content_size_bits);

        entries.push(PacketIndexEntry {
            offset_bytes: offset,
            packet_size_bits,
            content_size_bits,
            data_offset_bits,
            timestamp_begin,
            timestamp_end,
        });

        offset += (packet_size_bits / 8) as u64;
    }

    Ok(IndexResult {
        entries,
        stream_id: stream_id.unwrap_or(0),
    })
}

fn uuid_field_matches(value: &crate::definition::Value, expected: &Uuid) -> bool {
    // Metadata models a `uuid` field as a 16-element byte array/sequence.
    let bytes: Option<Vec<u8>> = match value {
        crate::definition::Value::Array(items) | crate::definition::Value::Sequence(items) => {
            items.iter().map(|v| v.as_u64().map(|b| b as u8)).collect()
        }
        _ => None,
    };
    match bytes {
        Some(b) if b.len() == 16 => b.as_slice() == expected.as_bytes().as_slice(),
        _ => true,
    }
}
