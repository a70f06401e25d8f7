//! Shared helpers for building synthetic trace directories in the
//! integration tests. All fields used here are byte-aligned so packet
//! bytes can be assembled with plain byte-slice concatenation; bit-level
//! packing is already covered by `bitcursor`'s unit tests.

use ctf_core::{
    ByteOrder, Declaration, EventClass, IntegerDecl, PreferredDisplayBase, StreamClass, TraceType,
};
use fxhash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub fn u32_field() -> Declaration {
    Declaration::Integer(IntegerDecl {
        size: 32,
        alignment: 8,
        signed: false,
        byte_order: ByteOrder::Little,
        display_base: PreferredDisplayBase::Decimal,
    })
}

pub fn u8_field() -> Declaration {
    Declaration::Integer(IntegerDecl {
        size: 8,
        alignment: 8,
        signed: false,
        byte_order: ByteOrder::Little,
        display_base: PreferredDisplayBase::Decimal,
    })
}

pub fn packet_header_decl() -> Declaration {
    Declaration::Struct(ctf_core::StructDecl {
        min_alignment: 8,
        fields: vec![
            ("magic".to_owned(), u32_field()),
            (
                "uuid".to_owned(),
                Declaration::Array(ctf_core::ArrayDecl {
                    length: 16,
                    element: Box::new(u8_field()),
                }),
            ),
            ("stream_id".to_owned(), u32_field()),
        ],
    })
}

pub fn packet_context_decl() -> Declaration {
    Declaration::Struct(ctf_core::StructDecl {
        min_alignment: 8,
        fields: vec![
            ("content_size".to_owned(), u32_field()),
            ("packet_size".to_owned(), u32_field()),
            ("timestamp_begin".to_owned(), u32_field()),
            ("timestamp_end".to_owned(), u32_field()),
        ],
    })
}

pub fn event_header_decl() -> Declaration {
    Declaration::Struct(ctf_core::StructDecl {
        min_alignment: 8,
        fields: vec![("id".to_owned(), u32_field()), ("timestamp".to_owned(), u32_field())],
    })
}

/// Builds a stream class with one event class `id = 0`, no contexts or
/// payload, bound to the header/context declarations above.
pub fn simple_stream_class() -> StreamClass {
    let mut events = FxHashMap::default();
    events.insert(
        0,
        EventClass {
            name: "event0".to_owned(),
            context: None,
            payload: None,
        },
    );
    StreamClass {
        name: "stream0".to_owned(),
        packet_context: Some(packet_context_decl()),
        event_header: Some(event_header_decl()),
        event_context: None,
        events,
    }
}

pub fn trace_type_with_stream(stream_id: u64, stream_class: StreamClass, uuid: Option<Uuid>) -> TraceType {
    let mut streams = FxHashMap::default();
    streams.insert(stream_id, stream_class);
    TraceType {
        byte_order: ByteOrder::Little,
        uuid,
        packet_header: Some(packet_header_decl()),
        streams,
    }
}

/// Encodes one packet: header + context + payload bytes, padded with
/// zeros to `packet_size_bytes`.
#[allow(clippy::too_many_arguments)]
pub fn build_packet(
    uuid: &Uuid,
    stream_id: u32,
    content_size_bits: u32,
    packet_size_bits: u32,
    timestamp_begin: u32,
    timestamp_end: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xC1FC_1FC1u32.to_le_bytes());
    out.extend_from_slice(uuid.as_bytes());
    out.extend_from_slice(&stream_id.to_le_bytes());
    out.extend_from_slice(&content_size_bits.to_le_bytes());
    out.extend_from_slice(&packet_size_bits.to_le_bytes());
    out.extend_from_slice(&timestamp_begin.to_le_bytes());
    out.extend_from_slice(&timestamp_end.to_le_bytes());
    out.extend_from_slice(payload);
    out.resize((packet_size_bits / 8) as usize, 0);
    out
}

/// Encodes one event: `id` then `timestamp`, both little-endian u32.
pub fn build_event(id: u32, timestamp: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out
}

pub fn write_trace_dir(dir: &Path, stream_files: &[(&str, Vec<u8>)]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("metadata"), b"/* CTF 1.8 */").unwrap();
    for (name, bytes) in stream_files {
        fs::write(dir.join(name), bytes).unwrap();
    }
    dir.to_path_buf()
}
