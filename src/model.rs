//! The CTF trace type model: declarations and the tables that bind them to
//! streams and events.
//!
//! Everything in this module is produced by the metadata collaborator (see
//! [`crate::metadata`]) and consumed read-only by the decoder
//! ([`crate::codec`]). None of it is mutated once a [`TraceType`] has been
//! handed to [`crate::trace::open_trace`].

use derive_more::Display;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StreamId = u64;
pub type EventId = u64;
pub type Timestamp = u64;

pub const CTF_MAGIC: u32 = 0xC1FC_1FC1;
pub const TSDL_MAGIC: u32 = 0x75D1_1D57;

/// Byte order a field is stored in on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum ByteOrder {
    #[display("little-endian")]
    Little,
    #[display("big-endian")]
    Big,
}

/// The preferred base (radix) to use when displaying an integer/enum value.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferredDisplayBase {
    Binary,
    Octal,
    #[default]
    Decimal,
    Hexadecimal,
}

/// One element of an enumeration's mapping sequence: either a single value
/// or an inclusive range.
#[derive(Clone, Debug)]
pub enum EnumRange {
    Value(i64),
    Range(i64, i64),
}

impl EnumRange {
    pub fn contains(&self, v: i64) -> bool {
        match self {
            Self::Value(x) => *x == v,
            Self::Range(lo, hi) => v >= *lo && v <= *hi,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IntegerDecl {
    /// Width in bits, 1..=64.
    pub size: u32,
    /// Bit alignment of the first bit of the field.
    pub alignment: u32,
    pub signed: bool,
    pub byte_order: ByteOrder,
    pub display_base: PreferredDisplayBase,
}

#[derive(Clone, Debug)]
pub struct FloatDecl {
    pub exp_len: u32,
    pub mant_len: u32,
    pub alignment: u32,
    pub byte_order: ByteOrder,
}

impl FloatDecl {
    pub fn total_bits(&self) -> u32 {
        self.exp_len + self.mant_len + 1
    }
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub base: IntegerDecl,
    pub mappings: Vec<(String, Vec<EnumRange>)>,
}

impl EnumDecl {
    pub fn label(&self, v: i64) -> Option<&str> {
        self.mappings
            .iter()
            .find(|(_, ranges)| ranges.iter().any(|r| r.contains(v)))
            .map(|(label, _)| label.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct StringDecl {
    pub alignment: u32,
}

impl Default for StringDecl {
    fn default() -> Self {
        Self { alignment: 8 }
    }
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    /// Minimum alignment declared on the struct itself; the effective
    /// alignment is the max of this and every field's alignment.
    pub min_alignment: u32,
    pub fields: Vec<(String, Declaration)>,
}

impl StructDecl {
    pub fn alignment(&self) -> u32 {
        self.fields
            .iter()
            .map(|(_, d)| d.alignment())
            .fold(self.min_alignment, u32::max)
    }
}

/// A variant (tagged union). `tag_name` is resolved against the enclosing
/// struct's scope at decode time and must land on an enumeration value;
/// the arm whose key matches that enumeration's label is decoded in the
/// variant's place (CTF variants are transparent: the field becomes
/// whatever its selected arm decodes to).
#[derive(Clone, Debug)]
pub struct VariantDecl {
    pub tag_name: String,
    pub arms: Vec<(String, Declaration)>,
}

#[derive(Clone, Debug)]
pub struct ArrayDecl {
    pub length: usize,
    pub element: Box<Declaration>,
}

/// A sequence whose length is resolved by name against the enclosing
/// struct's scope at decode time.
#[derive(Clone, Debug)]
pub struct SequenceDecl {
    pub length_field: String,
    pub element: Box<Declaration>,
}

#[derive(Clone, Debug)]
pub enum Declaration {
    Integer(IntegerDecl),
    Float(FloatDecl),
    Enum(EnumDecl),
    String(StringDecl),
    Struct(StructDecl),
    Variant(VariantDecl),
    Array(ArrayDecl),
    Sequence(SequenceDecl),
}

impl Declaration {
    /// Finds the bit width of an integer (or enum, via its base integer)
    /// field named `name` declared directly on this struct, or nested one
    /// level inside a variant field named `v` — mirroring the lookup order
    /// `event::extract_timestamp_sample` uses for the decoded value itself.
    pub fn integer_field_width(&self, name: &str) -> Option<u32> {
        let Declaration::Struct(s) = self else {
            return None;
        };
        for (field_name, decl) in &s.fields {
            if field_name == name {
                return match decl {
                    Declaration::Integer(d) => Some(d.size),
                    Declaration::Enum(d) => Some(d.base.size),
                    _ => None,
                };
            }
        }
        for (field_name, decl) in &s.fields {
            if field_name == "v" {
                if let Declaration::Variant(v) = decl {
                    for (_, arm) in &v.arms {
                        if let Some(w) = arm.integer_field_width(name) {
                            return Some(w);
                        }
                    }
                }
            }
        }
        None
    }

    pub fn alignment(&self) -> u32 {
        match self {
            Self::Integer(d) => d.alignment,
            Self::Float(d) => d.alignment,
            Self::Enum(d) => d.base.alignment,
            Self::String(d) => d.alignment,
            Self::Struct(d) => d.alignment(),
            // A variant has no alignment of its own; each arm aligns itself.
            Self::Variant(_) => 1,
            Self::Array(d) => d.element.alignment(),
            Self::Sequence(d) => d.element.alignment(),
        }
    }
}

/// An event class: the shared type definitions for one event id within a
/// stream class.
#[derive(Clone, Debug, Default)]
pub struct EventClass {
    pub name: String,
    pub context: Option<Declaration>,
    pub payload: Option<Declaration>,
}

/// A stream class: the type definitions shared by every file stream bound
/// to it, plus the sparse event-id table.
#[derive(Clone, Debug, Default)]
pub struct StreamClass {
    pub name: String,
    pub packet_context: Option<Declaration>,
    pub event_header: Option<Declaration>,
    pub event_context: Option<Declaration>,
    pub events: FxHashMap<EventId, EventClass>,
}

/// The trace type model as a whole: produced once by the metadata
/// collaborator and shared (read-only) by every file stream opened against
/// it.
#[derive(Clone, Debug)]
pub struct TraceType {
    pub byte_order: ByteOrder,
    pub uuid: Option<Uuid>,
    pub packet_header: Option<Declaration>,
    pub streams: FxHashMap<StreamId, StreamClass>,
}
