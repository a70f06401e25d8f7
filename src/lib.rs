#![doc = include_str!("../README.md")]

pub mod bitcursor;
pub mod codec;
pub mod definition;
pub mod error;
pub mod event;
pub mod indexer;
pub mod metadata;
pub mod model;
pub mod stream;
pub mod trace;

pub use crate::bitcursor::Access;
pub use crate::definition::Value;
pub use crate::error::Error;
pub use crate::event::Event;
pub use crate::indexer::PacketIndexEntry;
pub use crate::metadata::{MetadataCollaborator, StaticMetadata};
pub use crate::model::*;
pub use crate::trace::{open_mmap_trace, open_trace, MmapStreamSource, Trace};
