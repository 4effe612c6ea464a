//! Network subsystem for UDP audio transport

pub mod receiver;
pub mod sender;
pub mod sequence;
pub mod udp;

pub use receiver::ReceiveLoop;
pub use sender::{PacedSender, SendOutcome};
pub use sequence::{SequenceEvent, SequenceTracker, SequenceWindow};
