//! Call Record handles and the events that carry them.

use std::fmt;

/// Opaque handle correlating a queue event with the Call Record that caused it.
///
/// Packs the record's arena slot (low 32 bits) and the generation it was
/// inserted under (high 32 bits). A slot reused by a later record gets a new
/// generation, so a tag never aliases a destroyed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u64);

impl Tag {
	/// Builds a tag from an arena slot and generation.
	#[must_use]
	pub const fn new(slot: u32, generation: u32) -> Self {
		Self(((generation as u64) << 32) | slot as u64)
	}

	/// Reconstructs a tag from its raw encoding.
	#[must_use]
	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	/// Raw encoding, suitable for transports that carry a plain integer.
	#[must_use]
	pub const fn into_raw(self) -> u64 {
		self.0
	}

	/// Arena slot index.
	#[must_use]
	pub const fn slot(self) -> u32 {
		self.0 as u32
	}

	/// Generation the slot was filled under.
	#[must_use]
	pub const fn generation(self) -> u32 {
		(self.0 >> 32) as u32
	}
}

impl fmt::Display for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.slot(), self.generation())
	}
}

/// Readiness notification delivered through the completion queue.
///
/// `ok == false` reports a transport-level failure (typically shutdown), not
/// a business error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
	/// Record the event belongs to.
	pub tag: Tag,
	/// Whether the transport operation behind the event succeeded.
	pub ok: bool,
}

impl CompletionEvent {
	/// Successful completion for `tag`.
	#[must_use]
	pub const fn ok(tag: Tag) -> Self {
		Self { tag, ok: true }
	}

	/// Failed completion for `tag`.
	#[must_use]
	pub const fn failed(tag: Tag) -> Self {
		Self { tag, ok: false }
	}
}
