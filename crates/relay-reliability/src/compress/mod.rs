//! Transparent payload compression.

pub mod algorithm;
pub mod compressor;
pub mod stats;

pub use algorithm::CompressionAlgorithm;
pub use compressor::{AlgorithmBenchmark, CompressedEnvelope, CompressionResult, Compressor};
pub use stats::CompressionStats;
