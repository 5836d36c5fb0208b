//! YAML cassettes recording provider calls for offline replay.
//!
//! `TATTTY_REC=1` records a session, `TATTTY_REPLAY=<path>` replays it.

pub mod config;
pub mod format;
pub mod recorder;
pub mod replayer;
