mod chunks;
mod records;

pub use chunks::{Chunks, Error as ChunksError};
pub use records::{Error as RecordsError, Records};
