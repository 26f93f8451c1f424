//! Arena of live Call Records, addressed by [`Tag`].

use std::sync::Arc;

use parking_lot::Mutex;
use slab::Slab;

use crate::call::{CallRecord, CallState};
use crate::tag::Tag;

/// Integration defect detected while resolving a tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
	/// No record lives in the tag's slot.
	#[error("no call record for tag {0}")]
	Unknown(Tag),
	/// The slot was reused since the tag was issued.
	#[error("tag {tag} is stale; slot now holds generation {current}")]
	Stale {
		/// Offending tag.
		tag: Tag,
		/// Generation currently in the slot.
		current: u32,
	},
	/// A second event arrived while another worker holds the record.
	#[error("call record {0} is already being advanced")]
	InFlight(Tag),
	/// Check-in or removal of a record nobody checked out.
	#[error("call record {0} is not checked out")]
	NotCheckedOut(Tag),
}

/// Diagnostic view of one table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
	/// Record handle.
	pub tag: Tag,
	/// Method the record serves.
	pub method: Arc<str>,
	/// Last state the record was stored in.
	pub state: CallState,
	/// Whether a worker is advancing the record right now.
	pub in_flight: bool,
}

enum Residency {
	Resident(CallRecord),
	CheckedOut,
}

struct Entry {
	generation: u32,
	method: Arc<str>,
	state: CallState,
	residency: Residency,
}

struct TableInner {
	entries: Slab<Entry>,
	next_generation: u32,
}

/// Slab-backed arena mapping tags to Call Records.
///
/// A worker advancing a record checks it out, so the table lock is only held
/// for O(1) moves and never while a handler runs. Checking out an already
/// checked-out record means two events are outstanding for one tag, which
/// is reported as [`Violation::InFlight`].
pub(crate) struct CallTable {
	inner: Mutex<TableInner>,
}

impl CallTable {
	pub(crate) fn new() -> Self {
		Self {
			inner: Mutex::new(TableInner {
				entries: Slab::new(),
				next_generation: 1,
			}),
		}
	}

	/// Stores a record and returns its tag.
	pub(crate) fn insert(&self, record: CallRecord) -> Tag {
		let mut inner = self.inner.lock();
		let generation = inner.next_generation;
		inner.next_generation = inner.next_generation.wrapping_add(1).max(1);
		let key = inner.entries.insert(Entry {
			generation,
			method: Arc::clone(record.binding().name_arc()),
			state: record.state(),
			residency: Residency::Resident(record),
		});
		let Ok(slot) = u32::try_from(key) else {
			panic!("call table exceeded {} slots", u32::MAX);
		};
		Tag::new(slot, generation)
	}

	/// Takes a record out so the caller can advance it without the table lock.
	pub(crate) fn checkout(&self, tag: Tag) -> Result<CallRecord, Violation> {
		let mut inner = self.inner.lock();
		let entry = entry_mut(&mut inner.entries, tag)?;
		match std::mem::replace(&mut entry.residency, Residency::CheckedOut) {
			Residency::Resident(record) => Ok(record),
			Residency::CheckedOut => Err(Violation::InFlight(tag)),
		}
	}

	/// Returns a checked-out record to its slot.
	pub(crate) fn checkin(&self, tag: Tag, record: CallRecord) -> Result<(), Violation> {
		let mut inner = self.inner.lock();
		let entry = entry_mut(&mut inner.entries, tag)?;
		if !matches!(entry.residency, Residency::CheckedOut) {
			return Err(Violation::NotCheckedOut(tag));
		}
		entry.state = record.state();
		entry.residency = Residency::Resident(record);
		Ok(())
	}

	/// Stores the state a checked-out record has moved to, so counts and
	/// snapshots see it before check-in.
	pub(crate) fn mark(&self, tag: Tag, state: CallState) -> Result<(), Violation> {
		let mut inner = self.inner.lock();
		let entry = entry_mut(&mut inner.entries, tag)?;
		if !matches!(entry.residency, Residency::CheckedOut) {
			return Err(Violation::NotCheckedOut(tag));
		}
		entry.state = state;
		Ok(())
	}

	/// Frees the slot of a checked-out record.
	pub(crate) fn remove(&self, tag: Tag) -> Result<(), Violation> {
		let mut inner = self.inner.lock();
		let entry = entry_mut(&mut inner.entries, tag)?;
		if !matches!(entry.residency, Residency::CheckedOut) {
			return Err(Violation::NotCheckedOut(tag));
		}
		inner.entries.remove(tag.slot() as usize);
		Ok(())
	}

	pub(crate) fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	/// Records of `method` currently stored as ARMED.
	pub(crate) fn armed_count(&self, method: &str) -> usize {
		let inner = self.inner.lock();
		inner
			.entries
			.iter()
			.filter(|(_, entry)| entry.state == CallState::Armed && &*entry.method == method)
			.count()
	}

	pub(crate) fn snapshot(&self) -> Vec<CallSnapshot> {
		let inner = self.inner.lock();
		inner.entries.iter().map(|(key, entry)| snapshot_of(key, entry)).collect()
	}

	/// Destroys every remaining record, returning what was reclaimed.
	pub(crate) fn drain(&self) -> Vec<CallSnapshot> {
		let entries = std::mem::take(&mut self.inner.lock().entries);
		entries.into_iter().map(|(key, entry)| snapshot_of(key, &entry)).collect()
	}
}

fn entry_mut(entries: &mut Slab<Entry>, tag: Tag) -> Result<&mut Entry, Violation> {
	let entry = entries.get_mut(tag.slot() as usize).ok_or(Violation::Unknown(tag))?;
	if entry.generation != tag.generation() {
		return Err(Violation::Stale {
			tag,
			current: entry.generation,
		});
	}
	Ok(entry)
}

fn snapshot_of(key: usize, entry: &Entry) -> CallSnapshot {
	CallSnapshot {
		tag: Tag::new(key as u32, entry.generation),
		method: Arc::clone(&entry.method),
		state: entry.state,
		in_flight: matches!(entry.residency, Residency::CheckedOut),
	}
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;

	use super::*;
	use crate::binding::{Handler, MethodBinding};
	use crate::status::Outcome;
	use crate::transport::CallSlot;

	fn record(method: &str) -> CallRecord {
		let binding = MethodBinding::new(method, |_, _, _| {}, Handler::Inline(Arc::new(|_: &Bytes| Outcome::ok("ok"))));
		CallRecord::new(Arc::new(binding), CallSlot::new())
	}

	#[test]
	fn checkout_checkin_roundtrip() {
		let table = CallTable::new();
		let tag = table.insert(record("Echo"));
		assert_eq!(table.armed_count("Echo"), 1);

		let rec = table.checkout(tag).expect("resident");
		assert!(table.snapshot()[0].in_flight);
		table.checkin(tag, rec).expect("checked out");
		assert!(!table.snapshot()[0].in_flight);
	}

	#[test]
	fn accepted_record_stops_counting_as_armed() {
		let table = CallTable::new();
		let tag = table.insert(record("Echo"));
		let _rec = table.checkout(tag).unwrap();
		table.mark(tag, CallState::Processing).unwrap();

		assert_eq!(table.armed_count("Echo"), 0);
		let snapshot = &table.snapshot()[0];
		assert_eq!((snapshot.state, snapshot.in_flight), (CallState::Processing, true));
	}

	#[test]
	fn mark_requires_checkout() {
		let table = CallTable::new();
		let tag = table.insert(record("Echo"));
		assert_eq!(table.mark(tag, CallState::Processing).unwrap_err(), Violation::NotCheckedOut(tag));
	}

	#[test]
	fn double_checkout_is_in_flight_violation() {
		let table = CallTable::new();
		let tag = table.insert(record("Echo"));
		let _rec = table.checkout(tag).unwrap();
		assert_eq!(table.checkout(tag).unwrap_err(), Violation::InFlight(tag));
	}

	#[test]
	fn reused_slot_rejects_stale_tag() {
		let table = CallTable::new();
		let old = table.insert(record("Echo"));
		let _ = table.checkout(old).unwrap();
		table.remove(old).unwrap();

		let new = table.insert(record("Echo"));
		assert_eq!(new.slot(), old.slot());
		assert_ne!(new.generation(), old.generation());
		assert_eq!(
			table.checkout(old).unwrap_err(),
			Violation::Stale {
				tag: old,
				current: new.generation()
			}
		);
	}

	#[test]
	fn unknown_and_resident_misuse_are_reported() {
		let table = CallTable::new();
		let missing = Tag::new(42, 1);
		assert_eq!(table.checkout(missing).unwrap_err(), Violation::Unknown(missing));

		let tag = table.insert(record("Echo"));
		assert_eq!(table.remove(tag).unwrap_err(), Violation::NotCheckedOut(tag));
		assert_eq!(table.checkin(tag, record("Echo")).unwrap_err(), Violation::NotCheckedOut(tag));
	}

	#[test]
	fn drain_reclaims_everything() {
		let table = CallTable::new();
		table.insert(record("Echo"));
		table.insert(record("Fail"));
		let reclaimed = table.drain();
		assert_eq!(reclaimed.len(), 2);
		assert_eq!(table.len(), 0);
	}
}
