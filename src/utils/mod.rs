pub mod decompression;
pub mod time;

pub use decompression::{CompressionFormat, DecompressionService};
