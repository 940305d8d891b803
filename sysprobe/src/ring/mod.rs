//! In-process ring transport.
//!
//! A fixed byte region addressed by two monotonically increasing logical offsets.
//! Producers claim space with a compare-and-swap on the producer offset and never
//! wait: a claim either fits below `consumer + capacity` or fails with
//! [`Error::ReservationFull`]. The single consumer walks slot headers from the
//! consumer offset, stops at the first slot that is not yet committed, and hands
//! space back with [`RingConsumer::acknowledge`].
//!
//! Wrap policy: a slot never straddles the physical end of the region. When the
//! next slot does not fit in the remaining tail, the producer publishes a padding
//! slot covering the tail and places its record at the start of the next period.
//! Padding consumes capacity until it is acknowledged.

mod header;
mod reader;
mod reservation;

pub use reader::{Batch, Record, Records, RingConsumer};
pub use reservation::Reservation;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use zerocopy::{Immutable, IntoBytes};

use crate::error::{Error, Result};

pub(crate) use header::{slot_size, HDR_SZ, RECORD_ALIGN};

/// Creates a ring of `capacity` bytes and returns its two ends.
pub fn ring(capacity: usize) -> Result<(RingProducer, RingConsumer)> {
	let shared = Arc::new(RingShared::new(capacity)?);
	Ok((RingProducer { ring: shared.clone() }, RingConsumer::new(shared)))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RingStats {
	pub capacity: u64,
	pub producer_pos: u64,
	pub consumer_pos: u64,
	pub dropped: u64,
}

impl RingStats {
	/// Bytes claimed by producers and not yet acknowledged.
	pub fn pending(&self) -> u64 {
		self.producer_pos.saturating_sub(self.consumer_pos)
	}
}

pub(crate) struct RingShared {
	data: Box<[UnsafeCell<u64>]>,
	capacity: u64,
	producer_pos: AtomicU64,
	consumer_pos: AtomicU64,
	dropped: AtomicU64,
	notify: Notify,
}

// Producers only write inside ranges they won through the producer offset CAS,
// and the consumer only reads committed ranges below the producer offset.
unsafe impl Sync for RingShared {}

impl RingShared {
	fn new(capacity: usize) -> Result<Self> {
		if capacity < 4 * HDR_SZ || capacity % RECORD_ALIGN != 0 {
			return Err(Error::InvalidCapacity(capacity));
		}

		let data = (0..capacity / RECORD_ALIGN).map(|_| UnsafeCell::new(0u64)).collect();

		Ok(Self {
			data,
			capacity: capacity as u64,
			producer_pos: AtomicU64::new(0),
			consumer_pos: AtomicU64::new(0),
			dropped: AtomicU64::new(0),
			notify: Notify::new(),
		})
	}

	/// Largest payload that can always be placed, whatever the current phase.
	pub(crate) fn max_record_size(&self) -> usize {
		let half = self.capacity as usize / 2 - HDR_SZ;
		half.min(header::LEN_MASK as usize)
	}

	fn base(&self) -> *mut u8 {
		UnsafeCell::raw_get(self.data.as_ptr()) as *mut u8
	}

	fn phys(&self, pos: u64) -> usize {
		(pos % self.capacity) as usize
	}

	fn header(&self, pos: u64) -> &AtomicU32 {
		// slots are 8 byte aligned and the region is backed by u64 words
		unsafe { &*(self.base().add(self.phys(pos)) as *const AtomicU32) }
	}

	fn payload_ptr(&self, pos: u64) -> *mut u8 {
		unsafe { self.base().add(self.phys(pos) + HDR_SZ) }
	}

	pub(crate) fn reserve(&self, size: usize) -> Result<Reservation<'_>> {
		let max = self.max_record_size();
		if size == 0 || size > max {
			return Err(Error::InvalidRecordSize { size, max });
		}

		let need = slot_size(size) as u64;
		let mut prod = self.producer_pos.load(Ordering::Acquire);

		let (start, pad) = loop {
			let cons = self.consumer_pos.load(Ordering::Acquire);
			let tail = self.capacity - prod % self.capacity;
			let pad = if need > tail { tail } else { 0 };
			let next = prod + pad + need;

			// `prod` may be older than `cons`: never subtract them
			if next > cons + self.capacity {
				self.dropped.fetch_add(1, Ordering::Relaxed);
				return Err(Error::ReservationFull);
			}

			match self
				.producer_pos
				.compare_exchange_weak(prod, next, Ordering::AcqRel, Ordering::Acquire)
			{
				Ok(_) => break (prod, pad),
				Err(current) => prod = current,
			}
		};

		if pad > 0 {
			self.header(start).store(header::padding(pad as usize), Ordering::Release);
		}

		let pos = start + pad;
		self.header(pos).store(header::busy(size), Ordering::Release);

		Ok(Reservation::new(self, pos, size))
	}

	/// Clears `[from, to)` so stale bytes never read as a published header.
	fn zero_range(&self, from: u64, to: u64) {
		let len = (to - from) as usize;
		let start = self.phys(from);
		let first = len.min(self.capacity as usize - start);

		unsafe {
			std::ptr::write_bytes(self.base().add(start), 0, first);
			if len > first {
				std::ptr::write_bytes(self.base(), 0, len - first);
			}
		}
	}

	fn stats(&self) -> RingStats {
		// consumer first: the producer offset read after it is never behind it
		let consumer_pos = self.consumer_pos.load(Ordering::Acquire);
		RingStats {
			capacity: self.capacity,
			producer_pos: self.producer_pos.load(Ordering::Acquire),
			consumer_pos,
			dropped: self.dropped.load(Ordering::Relaxed),
		}
	}
}

/// Write end of the ring. Cheap to clone, one per producing thread.
#[derive(Clone)]
pub struct RingProducer {
	ring: Arc<RingShared>,
}

impl RingProducer {
	/// Claims `size` payload bytes. Fails immediately when the ring is full.
	pub fn reserve(&self, size: usize) -> Result<Reservation<'_>> {
		self.ring.reserve(size)
	}

	/// Reserves, copies `value` and commits in one step.
	pub fn output<T: IntoBytes + Immutable>(&self, value: &T) -> Result<()> {
		let bytes = value.as_bytes();
		let mut slot = self.ring.reserve(bytes.len())?;
		slot.as_mut_bytes().copy_from_slice(bytes);
		slot.submit();
		Ok(())
	}

	pub fn max_record_size(&self) -> usize {
		self.ring.max_record_size()
	}

	pub fn stats(&self) -> RingStats {
		self.ring.stats()
	}
}

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use std::thread;

	const FX_PAYLOAD: usize = 40;
	const FX_SLOT: usize = 48;

	#[test]
	fn ring_rejects_bad_capacity() -> Result<()> {
		assert!(matches!(ring(0), Err(Error::InvalidCapacity(0))));
		assert!(matches!(ring(100), Err(Error::InvalidCapacity(100))));
		assert!(matches!(ring(16), Err(Error::InvalidCapacity(16))));
		assert!(ring(144).is_ok());
		Ok(())
	}

	#[test]
	fn ring_rejects_bad_record_size() -> Result<()> {
		// -- Setup & Fixtures
		let (producer, _consumer) = ring(256)?;

		// -- Exec & Check
		assert!(matches!(producer.reserve(0), Err(Error::InvalidRecordSize { size: 0, .. })));
		assert!(matches!(
			producer.reserve(producer.max_record_size() + 1),
			Err(Error::InvalidRecordSize { .. })
		));
		assert_eq!(producer.stats().producer_pos, 0);
		Ok(())
	}

	#[test]
	fn ring_reservations_within_capacity_never_fail() -> Result<()> {
		// -- Setup & Fixtures
		let (producer, mut consumer) = ring(FX_SLOT * 4)?;

		// -- Exec
		for round in 0..10u8 {
			for _ in 0..4 {
				let mut slot = producer.reserve(FX_PAYLOAD)?;
				slot.as_mut_bytes().fill(round);
				slot.submit();
			}
			let batch = consumer.drain();
			let end = batch.end();
			assert_eq!(batch.len(), 4);
			consumer.acknowledge(end)?;
		}

		// -- Check
		let stats = producer.stats();
		assert_eq!(stats.dropped, 0);
		assert_eq!(stats.pending(), 0);
		assert_eq!(stats.producer_pos, (FX_SLOT * 40) as u64);
		Ok(())
	}

	#[test]
	fn ring_full_fails_without_moving_offsets() -> Result<()> {
		// -- Setup & Fixtures
		let (producer, mut consumer) = ring(FX_SLOT * 2)?;
		producer.reserve(FX_PAYLOAD)?.submit();
		producer.reserve(FX_PAYLOAD)?.submit();
		let before = producer.stats();

		// -- Exec
		let res = producer.reserve(FX_PAYLOAD);

		// -- Check
		assert!(matches!(res, Err(Error::ReservationFull)));
		let after = producer.stats();
		assert_eq!(after.producer_pos, before.producer_pos);
		assert_eq!(after.consumer_pos, before.consumer_pos);
		assert_eq!(after.dropped, 1);

		let end = consumer.drain().end();
		consumer.acknowledge(end)?;
		assert!(producer.reserve(FX_PAYLOAD).is_ok());
		Ok(())
	}

	#[test]
	fn ring_pads_to_period_boundary() -> Result<()> {
		// -- Setup & Fixtures
		// 128 byte ring: a 48 byte slot at 96 would straddle the end
		let (producer, mut consumer) = ring(128)?;
		producer.output(&[1u8; FX_PAYLOAD])?;
		producer.output(&[2u8; FX_PAYLOAD])?;
		let end = consumer.drain().end();
		consumer.acknowledge(end)?;

		// -- Exec
		producer.output(&[3u8; FX_PAYLOAD])?;

		// -- Check
		let stats = producer.stats();
		assert_eq!(stats.producer_pos, 128 + FX_SLOT as u64);
		let batch = consumer.drain();
		let records: Vec<_> = batch.iter().collect();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].offset(), 128);
		assert!(records[0].payload().iter().all(|&b| b == 3));
		Ok(())
	}

	#[test]
	fn ring_concurrent_producers_never_overlap() -> Result<()> {
		// -- Setup & Fixtures
		let fx_threads = 4usize;
		let fx_per_thread = 64usize;
		let (producer, mut consumer) = ring(FX_SLOT * fx_threads * fx_per_thread)?;

		// -- Exec
		let handles: Vec<_> = (0..fx_threads)
			.map(|t| {
				let producer = producer.clone();
				thread::spawn(move || {
					for i in 0..fx_per_thread {
						let mut slot = producer.reserve(FX_PAYLOAD).expect("space for every record");
						let bytes = slot.as_mut_bytes();
						bytes.fill(t as u8);
						bytes[0] = i as u8;
						slot.submit();
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().map_err(|_| "producer panicked")?;
		}

		// -- Check
		let batch = consumer.drain();
		assert_eq!(batch.len(), fx_threads * fx_per_thread);
		let mut next_per_thread = vec![0usize; fx_threads];
		for record in batch.iter() {
			let payload = record.payload();
			let t = payload[1] as usize;
			assert!(payload[1..].iter().all(|&b| b as usize == t), "torn record");
			assert_eq!(payload[0] as usize, next_per_thread[t]);
			next_per_thread[t] += 1;
		}
		Ok(())
	}

	#[test]
	fn ring_reserve_survives_consumer_racing_ahead() -> Result<()> {
		// -- Setup & Fixtures
		// tiny ring: producers constantly retry with offsets the consumer already passed
		let fx_threads = 8u64;
		let fx_attempts = 20_000u64;
		let (producer, mut consumer) = ring(64)?;

		// -- Exec
		let handles: Vec<_> = (0..fx_threads)
			.map(|t| {
				let producer = producer.clone();
				thread::spawn(move || (0..fx_attempts).filter(|_| producer.output(&t).is_ok()).count() as u64)
			})
			.collect();

		let mut received = 0u64;
		loop {
			let finished = handles.iter().all(|h| h.is_finished());
			let batch = consumer.drain();
			let end = batch.end();
			received += batch.len() as u64;
			consumer.acknowledge(end)?;
			assert!(consumer.stats().pending() <= 64);
			if finished && !consumer.has_pending() {
				break;
			}
		}

		// -- Check
		let mut submitted = 0u64;
		for handle in handles {
			submitted += handle.join().map_err(|_| "producer panicked")?;
		}
		let stats = producer.stats();
		assert_eq!(received, submitted);
		assert_eq!(stats.dropped, fx_threads * fx_attempts - submitted);
		assert_eq!(stats.pending(), 0);
		Ok(())
	}
}

// endregion: --- Tests
