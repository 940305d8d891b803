use std::slice;
use std::sync::atomic::Ordering;

use zerocopy::{FromBytes, IntoBytes, KnownLayout};

use super::{header, RingShared};
use crate::error::{Error, Result};

/// A claimed, not yet published slot.
///
/// The payload starts zeroed. Nothing is visible to the consumer until
/// [`Reservation::submit`]. Dropping an unsubmitted reservation discards it.
pub struct Reservation<'a> {
	ring: &'a RingShared,
	pos: u64,
	len: usize,
	settled: bool,
}

impl<'a> Reservation<'a> {
	pub(super) fn new(ring: &'a RingShared, pos: u64, len: usize) -> Self {
		Self {
			ring,
			pos,
			len,
			settled: false,
		}
	}

	/// Logical offset of the slot header.
	pub fn offset(&self) -> u64 {
		self.pos
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn as_mut_bytes(&mut self) -> &mut [u8] {
		// the range was won through the producer offset CAS and stays ours until settled
		unsafe { slice::from_raw_parts_mut(self.ring.payload_ptr(self.pos), self.len) }
	}

	/// Views the payload as `T` so fields can be written in place.
	pub fn as_event_mut<T>(&mut self) -> Result<&mut T>
	where
		T: FromBytes + IntoBytes + KnownLayout,
	{
		T::mut_from_bytes(self.as_mut_bytes()).map_err(|_| Error::InvalidEventSize)
	}

	/// Publishes the slot. Must be the last write into it.
	pub fn submit(mut self) {
		self.settle(header::committed(self.len));
	}

	/// Publishes the slot as skipped; the consumer steps over it.
	pub fn discard(mut self) {
		self.settle(header::discarded(self.len));
	}

	fn settle(&mut self, word: u32) {
		self.ring.header(self.pos).store(word, Ordering::Release);
		self.settled = true;
		self.ring.notify.notify_one();
	}
}

impl Drop for Reservation<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.settle(header::discarded(self.len));
		}
	}
}

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::super::ring;
	use sysprobe_common::SyscallEvent;

	#[test]
	fn reservation_invisible_until_submit() -> Result<()> {
		// -- Setup & Fixtures
		let (producer, mut consumer) = ring(256)?;
		let mut slot = producer.reserve(SyscallEvent::SIZE)?;
		slot.as_event_mut::<SyscallEvent>()?.pid = 7;

		// -- Exec & Check
		assert!(consumer.drain().is_empty());
		assert!(!consumer.has_pending());

		slot.submit();
		let batch = consumer.drain();
		assert_eq!(batch.len(), 1);
		let event: &SyscallEvent = batch.iter().next().ok_or("missing record")?.event()?;
		assert_eq!(event.pid, 7);
		Ok(())
	}

	#[test]
	fn reservation_blocks_later_commits_until_settled() -> Result<()> {
		// -- Setup & Fixtures
		let (producer, mut consumer) = ring(256)?;
		let first = producer.reserve(16)?;
		producer.reserve(16)?.submit();

		// -- Exec & Check
		// commit order is offset order: the second record waits behind the first
		assert!(consumer.drain().is_empty());
		first.submit();
		assert_eq!(consumer.drain().len(), 2);
		Ok(())
	}

	#[test]
	fn reservation_dropped_is_discarded() -> Result<()> {
		// -- Setup & Fixtures
		let (producer, mut consumer) = ring(256)?;

		// -- Exec
		drop(producer.reserve(16)?);
		producer.reserve(16)?.discard();
		producer.output(&[9u8; 16])?;

		// -- Check
		let batch = consumer.drain();
		assert_eq!(batch.len(), 1);
		assert_eq!(batch.end(), 72);
		let record = batch.iter().next().ok_or("missing record")?;
		assert_eq!(record.offset(), 48);
		assert_eq!(record.payload(), &[9u8; 16]);
		Ok(())
	}

	#[test]
	fn reservation_wrong_event_size_is_rejected() -> Result<()> {
		let (producer, _consumer) = ring(256)?;
		let mut slot = producer.reserve(16)?;
		assert!(slot.as_event_mut::<SyscallEvent>().is_err());
		Ok(())
	}
}
