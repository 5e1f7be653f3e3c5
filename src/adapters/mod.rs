//! Adapters implementing domain ports.
//!
//! Infrastructure implementations of the traits in [`crate::ports`]: checkpoint
//! storage (MessagePack on disk, or in memory for tests) and scalar metric
//! sinks (JSON Lines on disk, or in memory for tests).

pub mod in_memory_checkpoint;
pub mod in_memory_metrics;
pub mod jsonl_metrics;
pub mod msgpack_checkpoint;

pub use in_memory_checkpoint::InMemoryCheckpointRepository;
pub use in_memory_metrics::InMemoryScalarSink;
pub use jsonl_metrics::{JsonlScalarWriter, SCALARS_FILE, read_scalars};
pub use msgpack_checkpoint::MsgPackCheckpointRepository;
