//! # scapstream-recv: Headless Frame Receiver
//!
//! Binds the configured transport, reassembles frames sent by a capture
//! process, and polls the latest frame at a fixed interval the way a
//! renderer would. Statistics are logged every window; the last frame
//! can be dumped to disk on exit.

pub mod config;
pub mod monitor;
