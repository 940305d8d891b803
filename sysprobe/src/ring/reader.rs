use std::slice;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use zerocopy::{FromBytes, Immutable, KnownLayout};

use super::{header, slot_size, RingShared, RingStats};
use crate::error::{Error, Result};

/// Read end of the ring. There is exactly one per ring.
pub struct RingConsumer {
	ring: Arc<RingShared>,
	drained_pos: u64,
}

impl RingConsumer {
	pub(super) fn new(ring: Arc<RingShared>) -> Self {
		Self { ring, drained_pos: 0 }
	}

	/// Collects every committed slot from the last acknowledged offset up to the
	/// producer offset seen now, stopping at the first unsettled slot.
	///
	/// Slots that were drained but not acknowledged are returned again.
	pub fn drain(&mut self) -> Batch<'_> {
		let start = self.ring.consumer_pos.load(Ordering::Acquire);
		let limit = self.ring.producer_pos.load(Ordering::Acquire);

		let mut pos = start;
		let mut count = 0;
		while pos < limit {
			let word = self.ring.header(pos).load(Ordering::Acquire);
			if !header::is_settled(word) {
				break;
			}
			if header::is_record(word) {
				count += 1;
			}
			pos += slot_size(header::len(word)) as u64;
		}

		self.drained_pos = pos;

		Batch {
			ring: &*self.ring,
			start,
			end: pos,
			count,
		}
	}

	/// Hands `[consumer offset, upto)` back to producers.
	///
	/// Offsets at or below the current consumer offset are a no-op. `upto` must be
	/// a slot boundary no further than the last drain reached.
	pub fn acknowledge(&mut self, upto: u64) -> Result<()> {
		let cons = self.ring.consumer_pos.load(Ordering::Acquire);
		if upto <= cons {
			return Ok(());
		}
		if upto > self.drained_pos {
			return Err(Error::AcknowledgeOutOfRange {
				upto,
				drained: self.drained_pos,
			});
		}
		if !self.is_slot_boundary(cons, upto) {
			return Err(Error::AcknowledgeMisaligned { upto });
		}

		self.ring.zero_range(cons, upto);
		self.ring.consumer_pos.store(upto, Ordering::Release);
		Ok(())
	}

	// Walks the settled headers in `[cons, drained_pos)`; they stay untouched until acknowledged.
	fn is_slot_boundary(&self, cons: u64, upto: u64) -> bool {
		let mut pos = cons;
		while pos < upto {
			let word = self.ring.header(pos).load(Ordering::Acquire);
			if !header::is_settled(word) {
				return false;
			}
			pos += slot_size(header::len(word)) as u64;
		}
		pos == upto
	}

	/// True when the slot at the consumer offset has been settled.
	pub fn has_pending(&self) -> bool {
		let cons = self.ring.consumer_pos.load(Ordering::Acquire);
		let prod = self.ring.producer_pos.load(Ordering::Acquire);
		cons < prod && header::is_settled(self.ring.header(cons).load(Ordering::Acquire))
	}

	/// Resolves once at least one slot may be ready. Can wake spuriously.
	pub async fn readable(&self) {
		if self.has_pending() {
			return;
		}
		// a commit racing with the check leaves a permit behind
		self.ring.notify.notified().await;
	}

	pub fn stats(&self) -> RingStats {
		self.ring.stats()
	}
}

/// Committed slots returned by one [`RingConsumer::drain`].
pub struct Batch<'a> {
	ring: &'a RingShared,
	start: u64,
	end: u64,
	count: usize,
}

impl<'a> Batch<'a> {
	pub fn start(&self) -> u64 {
		self.start
	}

	/// Offset to pass to [`RingConsumer::acknowledge`] once the batch is handled.
	pub fn end(&self) -> u64 {
		self.end
	}

	/// Number of records, padding and discarded slots excluded.
	pub fn len(&self) -> usize {
		self.count
	}

	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	pub fn iter(&self) -> Records<'a> {
		Records {
			ring: self.ring,
			pos: self.start,
			end: self.end,
		}
	}
}

impl<'a> IntoIterator for &Batch<'a> {
	type Item = Record<'a>;
	type IntoIter = Records<'a>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

pub struct Records<'a> {
	ring: &'a RingShared,
	pos: u64,
	end: u64,
}

impl<'a> Iterator for Records<'a> {
	type Item = Record<'a>;

	fn next(&mut self) -> Option<Self::Item> {
		while self.pos < self.end {
			let offset = self.pos;
			let word = self.ring.header(offset).load(Ordering::Acquire);
			let len = header::len(word);
			self.pos += slot_size(len) as u64;

			if header::is_record(word) {
				// committed bytes stay untouched until the consumer acknowledges them
				let payload = unsafe { slice::from_raw_parts(self.ring.payload_ptr(offset), len) };
				return Some(Record {
					offset,
					end: self.pos,
					payload,
				});
			}
		}
		None
	}
}

#[derive(Clone, Copy, Debug)]
pub struct Record<'a> {
	offset: u64,
	end: u64,
	payload: &'a [u8],
}

impl<'a> Record<'a> {
	pub fn offset(&self) -> u64 {
		self.offset
	}

	pub fn end(&self) -> u64 {
		self.end
	}

	pub fn payload(&self) -> &'a [u8] {
		self.payload
	}

	pub fn event<T>(&self) -> Result<&'a T>
	where
		T: FromBytes + KnownLayout + Immutable,
	{
		T::ref_from_bytes(self.payload).map_err(|_| Error::InvalidEventSize)
	}
}
