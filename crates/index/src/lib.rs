mod flat;
mod records;

pub use flat::{FlatIpIndex, SearchHit};
pub use records::{ChunkRecord, JsonlWriter};
