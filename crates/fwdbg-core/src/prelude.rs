//! Common module for library exports

pub use crate::blob::{decode, Blob, DecodedBlob};
pub use crate::config::{CompressionConfig, ExtractConfig, NormalizerConfig};
pub use crate::error::{FwdbgError, FwdbgResult};
pub use crate::pipeline::{extract_tables, generate, generate_from_bytes, BlobStats, DebugTables};
pub use crate::types::{Directive, RawSymbol, Recovery, Symbol, UnwindRange};
