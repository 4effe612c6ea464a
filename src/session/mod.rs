//! Stream session orchestration
//!
//! Wires the engine components into running sender/receiver sessions: thread
//! spawning, the shared running flag, and orderly shutdown (flag, join,
//! release).

pub mod receiver;
pub mod sender;

pub use receiver::ReceiverSession;
pub use sender::SenderSession;
