//! Transient models produced by the BOQ parsing pipeline

pub mod boq_item;

pub use boq_item::{BoqItem, BoqParseResult, ParseMetadata, SourceFormat};
