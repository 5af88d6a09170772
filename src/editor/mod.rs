//! # Editor Module
//!
//! The live editing session. An [`EditorSession`] owns the audio graph, frame
//! renderer, scheduler, trim selector and capture controller, and drives them
//! from one task: user commands, display refresh, encoder sampling and the
//! 100 ms duration poll all arrive through a single `tokio::select!` loop.

pub mod session;

pub use session::{EditorCommand, EditorSession, SessionEvent};
