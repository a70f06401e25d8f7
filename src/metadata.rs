//! The boundary to the out-of-scope TSDL grammar.
//!
//! The trace opener assembles raw metadata text exactly as the packetized
//! or plain-text framing dictates, then hands it to a
//! [`MetadataCollaborator`] to get back a [`TraceType`]. This crate never
//! parses TSDL itself.

use crate::error::Error;
use crate::model::TraceType;

/// Parses assembled TSDL text into a trace type model. Implementations of
/// this trait are the real metadata grammar; this crate only calls
/// through the trait.
pub trait MetadataCollaborator {
    fn parse(&self, tsdl_text: &str) -> Result<TraceType, Error>;
}

/// A collaborator that ignores the text it's given and always returns a
/// [`TraceType`] fixed at construction time. Stands in for the real TSDL
/// grammar so this crate's own tests and `demos/read_trace` can open real
/// trace directories without one.
pub struct StaticMetadata {
    trace_type: TraceType,
}

impl StaticMetadata {
    pub fn new(trace_type: TraceType) -> Self {
        Self { trace_type }
    }
}

impl MetadataCollaborator for StaticMetadata {
    fn parse(&self, _tsdl_text: &str) -> Result<TraceType, Error> {
        Ok(self.trace_type.clone())
    }
}
