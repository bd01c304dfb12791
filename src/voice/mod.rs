//! # Voice Processing Module
//!
//! The streaming core of the service: per-session bookkeeping and the
//! audio-turn pipeline. The WebSocket actor in `crate::websocket` drives
//! both, one connection at a time.
//!
//! ## Key Components:
//! - **Pipeline**: transcribe → complete → synthesize for one audio turn
//! - **Session**: the immutable per-connection profile and the process-wide
//!   registry of live sessions

pub mod pipeline;
pub mod session;

pub use pipeline::VoicePipeline;
pub use session::{SessionEntry, SessionRegistry, UserProfile};
