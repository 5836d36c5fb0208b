//! Adapter implementations for port traits.
//!
//! - `live/`: provider HTTP clients
//! - `recording/`: wrap a live adapter and capture each call to a cassette
//! - `replaying/`: answer from a cassette without touching the network

pub mod live;
pub mod recording;
pub mod replaying;
