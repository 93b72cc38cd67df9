//! # scapstream-core
//!
//! Frame reassembly for screen captures streamed by an external capture
//! process over TCP or UDP.
//!
//! This crate contains:
//! - **Wire**: `StreamMetadata`, `DatagramMetadata`, packed chunk encoding and sanity ceilings
//! - **Reader**: `ExactReader` for exact-length reads from a byte stream
//! - **Decoders**: `StreamFrameDecoder` and `DatagramFrameDecoder` with `FrameAssemblyState`
//! - **Slot**: `LatestFrameSlot` holding the newest frame, with windowed `FrameStats`
//! - **Receiver**: `Receiver`, the background receive loop and its owner handle
//! - **Senders**: `StreamFrameSender` and `DatagramFrameSender` for test sources and tools
//! - **Error**: `ScapError`, a typed, `thiserror`-based error hierarchy

pub mod assembly;
pub mod config;
pub mod datagram;
pub mod error;
pub mod frame;
pub mod reader;
pub mod receiver;
pub mod sender;
pub mod slot;
pub mod state;
pub mod stream;
pub mod throughput;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use assembly::{FrameAssemblyState, Placement};
pub use config::{TransportConfig, TransportKind};
pub use datagram::{DatagramFrameDecoder, DatagramSource};
pub use error::ScapError;
pub use frame::{Frame, PixelFormat, bgra_to_rgba};
pub use reader::ExactReader;
pub use receiver::{Receiver, ReceiverBuilder, ReceiverControl, ReceiverEvent};
pub use sender::{DatagramFrameSender, StreamFrameSender};
pub use slot::{FrameStats, LatestFrameSlot, SlotReader, StatsCallback};
pub use state::ReceiverPhase;
pub use stream::StreamFrameDecoder;
pub use throughput::ThroughputMeter;
pub use wire::{
    DATAGRAM_METADATA_SIZE, DatagramMetadata, MAX_CHUNK_COUNT, MAX_TOTAL_SIZE, PackedChunks,
    STREAM_METADATA_SIZE, SanityLimits, StreamMetadata,
};
