//! # scapstream-pattern: Synthetic Capture Source
//!
//! Stands in for the screen-capture process: renders a moving BGRA
//! gradient at a target frame rate and sends it to a scapstream receiver
//! over TCP or UDP, using the same wire format a real capture source uses.

pub mod config;
pub mod pattern;
pub mod source;
