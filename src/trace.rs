//! Trace opener: the public entry point that ties the other components
//! together into a `Trace` handle.

use crate::bitcursor::Access;
use crate::error::Error;
use crate::event::Event;
use crate::indexer::PacketIndexEntry;
use crate::metadata::MetadataCollaborator;
use crate::model::{StreamId, TraceType, TSDL_MAGIC};
use crate::stream::FileStream;
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const METADATA_FILE_NAME: &str = "metadata";
const METADATA_PACKET_HEADER_BYTES: usize = 4 + 16 + 4 + 4 + 4 + 1 + 1 + 1 + 1 + 1;
const SUPPORTED_TSDL_MAJOR: u8 = 1;
const SUPPORTED_TSDL_MINOR: u8 = 8;

/// A pre-mapped stream source for [`open_mmap_trace`]: bypasses per-file
/// `fd`-based opening by supplying both the mapped bytes and a synthetic
/// packet index inline, the way the original interface's `metadata_fp`
/// parameter and externally-supplied index replaced directory-based
/// opening and `create_stream_packet_index`, respectively.
pub struct MmapStreamSource {
    pub data: Arc<[u8]>,
    pub index: Vec<PacketIndexEntry>,
    pub stream_id: StreamId,
    pub metadata: Vec<u8>,
}

/// An open trace: the assembled object graph of stream classes and file
/// streams for one trace directory. Dropping a `Trace` releases every
/// file descriptor and mapping it holds; there is no explicit
/// `close_trace` function because `Drop` already is one.
pub struct Trace {
    collection_path: PathBuf,
    path: PathBuf,
    domain: String,
    procname: String,
    vpid: String,
    trace_type: TraceType,
    streams: Vec<FileStream>,
}

impl Trace {
    pub fn collection_path(&self) -> &Path {
        &self.collection_path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn procname(&self) -> &str {
        &self.procname
    }

    pub fn vpid(&self) -> &str {
        &self.vpid
    }

    pub fn trace_type(&self) -> &TraceType {
        &self.trace_type
    }

    /// Reads the next event from the file stream bound to `stream_id`.
    /// Returns `Ok(None)` once that stream is exhausted.
    pub fn read_event(&mut self, stream_id: StreamId) -> Result<Option<Event>, Error> {
        let trace_type = &self.trace_type;
        let stream = self
            .streams
            .iter_mut()
            .find(|s| s.stream_id == stream_id)
            .ok_or(Error::UndefinedStreamId(stream_id))?;
        let stream_class = trace_type
            .streams
            .get(&stream_id)
            .ok_or(Error::UndefinedStreamId(stream_id))?;
        stream.read_event(stream_class)
    }
}

/// Opens a trace directory for reading: assembles metadata text, hands it
/// to `collaborator`, then indexes every non-metadata file as a stream.
pub fn open_trace(
    collection_path: &Path,
    path: &Path,
    access: Access,
    collaborator: &dyn MetadataCollaborator,
) -> Result<Trace, Error> {
    if access != Access::Read {
        return Err(Error::WriteUnsupported);
    }

    let (domain, procname, vpid) = derive_directory_fields(collection_path, path);

    let metadata_path = path.join(METADATA_FILE_NAME);
    let tsdl_text = read_metadata_text(&metadata_path)?;
    let trace_type = collaborator.parse(&tsdl_text)?;
    tracing::debug!(
        path = %path.display(),
        byte_order = %trace_type.byte_order,
        "opened trace metadata"
    );

    let entries: Vec<_> = fs::read_dir(path)
        .map_err(|e| Error::io(path, e))?
        .collect::<Result<_, _>>()
        .map_err(|e| Error::io(path, e))?;

    let mut streams = Vec::new();
    for entry in entries.into_iter().sorted_by_key(|e| e.file_name()) {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') || name == METADATA_FILE_NAME {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| Error::io(path, e))?;
        if !file_type.is_file() {
            continue;
        }
        let stream = FileStream::open(&entry.path(), &trace_type)?;
        streams.push(stream);
    }

    Ok(Trace {
        collection_path: collection_path.to_path_buf(),
        path: path.to_path_buf(),
        domain,
        procname,
        vpid,
        trace_type,
        streams,
    })
}

/// Alternative entry point for pre-mapped streams that bypass per-file
/// `fd`-based opening: each [`MmapStreamSource`] already carries its
/// mapped bytes and its own packet index, so there is no directory walk
/// and no per-file `index_packets` call — the synthetic index supplied
/// inline replaces it entirely.
pub fn open_mmap_trace(
    streams: Vec<MmapStreamSource>,
    collaborator: &dyn MetadataCollaborator,
) -> Result<Trace, Error> {
    let first = streams
        .first()
        .ok_or_else(|| Error::Metadata("open_mmap_trace requires at least one stream".into()))?;
    let tsdl_text = String::from_utf8_lossy(&first.metadata).into_owned();
    let trace_type = collaborator.parse(&tsdl_text)?;

    let mut file_streams = Vec::new();
    for source in streams {
        file_streams.push(FileStream::from_mapped(
            source.data,
            source.index,
            source.stream_id,
            &trace_type,
        )?);
    }

    Ok(Trace {
        collection_path: PathBuf::new(),
        path: PathBuf::new(),
        domain: String::new(),
        procname: String::new(),
        vpid: String::new(),
        trace_type,
        streams: file_streams,
    })
}

/// Derives `domain` (first path component under `collection_path`) and
/// `procname`/`vpid` from the trailing directory name's triple-dash split
/// `procname-vpid-date-time`, parsed right-to-left. A directory name with
/// fewer than three dashes leaves `procname`/`vpid` empty, matching the
/// original's unchecked-buffer behavior made explicit (see DESIGN.md).
fn derive_directory_fields(collection_path: &Path, path: &Path) -> (String, String, String) {
    let domain = path
        .strip_prefix(collection_path)
        .ok()
        .and_then(|rel| rel.components().next())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default();

    let last = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parts: Vec<&str> = last.rsplitn(4, '-').collect();
    let (procname, vpid) = if parts.len() == 4 {
        // parts is [time, date, vpid, procname] reversed
        (parts[3].to_owned(), parts[2].to_owned())
    } else {
        (String::new(), String::new())
    };

    (domain, procname, vpid)
}

fn read_metadata_text(metadata_path: &Path) -> Result<String, Error> {
    let bytes = fs::read(metadata_path).map_err(|e| Error::io(metadata_path, e))?;
    if bytes.len() < 4 {
        return Err(Error::FileTooSmall {
            path: metadata_path.to_path_buf(),
        });
    }
    let magic_le = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let magic_be = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    if magic_le == TSDL_MAGIC || magic_be == TSDL_MAGIC {
        read_packetized_metadata(&bytes, metadata_path, magic_be == TSDL_MAGIC)
    } else {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if !text.trim_start().starts_with("/* CTF") {
            tracing::warn!(
                path = %metadata_path.display(),
                "plain-text metadata missing '/* CTF x.y' header"
            );
        }
        Ok(text)
    }
}

fn read_packetized_metadata(bytes: &[u8], path: &Path, big_endian: bool) -> Result<String, Error> {
    let mut text = String::new();
    let mut offset = 0usize;
    let mut trace_uuid: Option<Uuid> = None;

    while offset < bytes.len() {
        if bytes.len() - offset < METADATA_PACKET_HEADER_BYTES {
            break;
        }
        let read_u32 = |s: &[u8]| -> u32 {
            let arr: [u8; 4] = s.try_into().unwrap();
            if big_endian {
                u32::from_be_bytes(arr)
            } else {
                u32::from_le_bytes(arr)
            }
        };

        let mut p = offset;
        let _magic = read_u32(&bytes[p..p + 4]);
        p += 4;
        let uuid_bytes = &bytes[p..p + 16];
        p += 16;
        let _checksum = read_u32(&bytes[p..p + 4]);
        p += 4;
        let content_size = read_u32(&bytes[p..p + 4]) as usize;
        p += 4;
        let packet_size = read_u32(&bytes[p..p + 4]) as usize;
        p += 4;
        let compression_scheme = bytes[p];
        p += 1;
        let encryption_scheme = bytes[p];
        p += 1;
        let checksum_scheme = bytes[p];
        p += 1;
        let major = bytes[p];
        p += 1;
        let minor = bytes[p];
        p += 1;

        if major != SUPPORTED_TSDL_MAJOR || minor != SUPPORTED_TSDL_MINOR {
            tracing::warn!(
                path = %path.display(),
                major,
                minor,
                "metadata packet declares an unsupported TSDL version, continuing anyway"
            );
        }

        if compression_scheme != 0 {
            return Err(Error::unsupported_scheme("compression", compression_scheme));
        }
        if encryption_scheme != 0 {
            return Err(Error::unsupported_scheme("encryption", encryption_scheme));
        }
        if checksum_scheme != 0 {
            return Err(Error::unsupported_scheme("checksum", checksum_scheme));
        }

        let uuid = Uuid::from_slice(uuid_bytes).map_err(|_| Error::Metadata("malformed UUID in metadata packet header".into()))?;
        match &trace_uuid {
            None => trace_uuid = Some(uuid),
            Some(prev) if *prev != uuid => return Err(Error::UuidMismatch),
            _ => {}
        }

        let header_bits = METADATA_PACKET_HEADER_BYTES * 8;
        let payload_bytes = content_size / 8 - METADATA_PACKET_HEADER_BYTES;
        if content_size < header_bits || p + payload_bytes > bytes.len() {
            return Err(Error::Metadata(format!(
                "metadata packet at {path:?} declares a content_size smaller than its header or its payload"
            )));
        }
        text.push_str(&String::from_utf8_lossy(&bytes[p..p + payload_bytes]));

        offset += packet_size / 8;
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_fields_from_triple_dash_directory_name() {
        let collection = Path::new("/traces");
        let path = Path::new("/traces/kernel/myproc-42-20240101-100000");
        let (domain, procname, vpid) = derive_directory_fields(collection, path);
        assert_eq!(domain, "kernel");
        assert_eq!(procname, "myproc");
        assert_eq!(vpid, "42");
    }

    #[test]
    fn leaves_procname_vpid_empty_without_three_dashes() {
        let collection = Path::new("/traces");
        let path = Path::new("/traces/kernel/onlyonedash");
        let (_domain, procname, vpid) = derive_directory_fields(collection, path);
        assert_eq!(procname, "");
        assert_eq!(vpid, "");
    }
}
