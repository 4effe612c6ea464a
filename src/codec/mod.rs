//! Opus codec wrapper
//!
//! Restricted low-delay encoding and decoding for the streaming engine. The
//! engine treats payloads as opaque; only these wrappers know they are Opus.

pub mod decoder;
pub mod encoder;

pub use decoder::OpusDecoder;
pub use encoder::OpusEncoder;
