use clap::Parser as ClapParser;
use ctf_core::{open_trace, Access, StaticMetadata, StreamId, TraceType};
use fxhash::FxHashMap;
use std::path::PathBuf;
use tracing::error;

/// CTF trace reader example
#[derive(Debug, clap::Parser)]
struct Opts {
    /// The trace directory to open
    pub trace: PathBuf,

    /// The stream id to read events from
    #[arg(long, default_value_t = 0)]
    pub stream_id: StreamId,
}

fn main() {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();

    // No TSDL grammar is implemented in this crate (see README.md); an
    // empty trace type only decodes packet headers with no declared
    // fields. Callers with a real TSDL parser supply their own
    // MetadataCollaborator here instead.
    let trace_type = TraceType {
        byte_order: ctf_core::ByteOrder::Little,
        uuid: None,
        packet_header: None,
        streams: FxHashMap::default(),
    };
    let collaborator = StaticMetadata::new(trace_type);

    let collection_path = opts
        .trace
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| opts.trace.clone());

    let mut trace = match open_trace(&collection_path, &opts.trace, Access::Read, &collaborator) {
        Ok(t) => t,
        Err(e) => {
            error!("{e}");
            return;
        }
    };

    loop {
        match trace.read_event(opts.stream_id) {
            Ok(Some(event)) => println!("{event:#?}"),
            Ok(None) => break,
            Err(e) => {
                error!("{e}");
                break;
            }
        }
    }
}
