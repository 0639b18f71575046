//! Text splitting: page units into bounded, overlapping chunks.

mod chunking;
pub mod types;

pub use chunking::{TextSplitter, compute_chunk_hash};
pub use types::{Chunk, ChunkMetadata, SplitError, SplitUnit, SplitterConfig};
