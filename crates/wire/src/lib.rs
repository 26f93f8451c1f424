//! Wire types for cqrpc over byte streams.
//!
//! Frames are a `u32` little-endian length followed by a `postcard` body.
//! Request and response payloads are themselves `postcard`-encoded message
//! structs from [`messages`], so the engine only ever sees opaque bytes.

#![warn(missing_docs)]

pub mod frame;
pub mod messages;

pub use frame::{Frame, MAX_FRAME_LEN, Request, Response, read_frame, write_frame};
pub use messages::{decode, encode};

/// Result alias for wire operations.
pub type Result<T, E = WireError> = std::result::Result<T, E>;

/// Failure to read, write, or (de)serialize a frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
	/// Underlying stream failed.
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	/// Body could not be encoded or decoded.
	#[error("codec error: {0}")]
	Codec(#[from] postcard::Error),
	/// Declared frame length exceeds [`MAX_FRAME_LEN`].
	#[error("frame of {len} bytes exceeds the {max} byte limit")]
	FrameTooLarge {
		/// Declared or encoded length.
		len: usize,
		/// Configured maximum.
		max: usize,
	},
}
