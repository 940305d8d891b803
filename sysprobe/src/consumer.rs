//! Single consumer drain loop.
//!
//! WaitingForData -> Draining -> Processing -> Acknowledging -> WaitingForData,
//! with Stopped reachable from any state once the shutdown token fires.

use sysprobe_common::SyscallEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handler::RecordHandler;
use crate::ring::RingConsumer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
	WaitingForData,
	Draining,
	Processing,
	Acknowledging,
	Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
	pub batches: u64,
	pub spurious_wakes: u64,
	pub processed: u64,
	pub handler_failures: u64,
	pub invalid_records: u64,
}

pub struct ConsumerWorker<H> {
	consumer: RingConsumer,
	handler: H,
	state: ConsumerState,
	stats: ConsumerStats,
}

impl<H: RecordHandler> ConsumerWorker<H> {
	pub fn new(consumer: RingConsumer, handler: H) -> Self {
		Self {
			consumer,
			handler,
			state: ConsumerState::WaitingForData,
			stats: ConsumerStats::default(),
		}
	}

	pub fn state(&self) -> ConsumerState {
		self.state
	}

	pub fn stats(&self) -> ConsumerStats {
		self.stats
	}

	/// Runs until `shutdown` fires, then drains once more and stops.
	pub async fn run(mut self, shutdown: CancellationToken) -> Result<ConsumerStats> {
		loop {
			self.state = ConsumerState::WaitingForData;

			tokio::select! {
				biased;
				_ = shutdown.cancelled() => break,
				_ = self.consumer.readable() => {}
			}

			self.drain_once()?;
		}

		let last = self.drain_pass(false)?;
		debug!("final drain delivered {last} records");

		self.state = ConsumerState::Stopped;
		info!(
			"consumer stopped: processed={} handler_failures={} invalid={}",
			self.stats.processed, self.stats.handler_failures, self.stats.invalid_records
		);

		Ok(self.stats)
	}

	/// One Draining -> Processing -> Acknowledging pass. Returns the records handled.
	pub fn drain_once(&mut self) -> Result<usize> {
		self.drain_pass(true)
	}

	// `woken`: the pass follows a readiness wake, so an empty batch was spurious.
	fn drain_pass(&mut self, woken: bool) -> Result<usize> {
		self.state = ConsumerState::Draining;
		let batch = self.consumer.drain();
		let end = batch.end();

		if batch.is_empty() {
			// padding or discarded slots still need to be handed back
			self.consumer.acknowledge(end)?;
			if woken {
				self.stats.spurious_wakes += 1;
			}
			self.state = ConsumerState::WaitingForData;
			return Ok(0);
		}

		self.state = ConsumerState::Processing;
		let mut handled = 0;
		for record in batch.iter() {
			handled += 1;
			let event = match record.event::<SyscallEvent>() {
				Ok(event) => event,
				Err(err) => {
					self.stats.invalid_records += 1;
					warn!("skipping record at {}: {err}", record.offset());
					continue;
				}
			};

			match self.handler.handle(event) {
				Ok(()) => self.stats.processed += 1,
				Err(err) => {
					self.stats.handler_failures += 1;
					warn!("handler failed for record at {}: {err}", record.offset());
				}
			}
		}

		self.state = ConsumerState::Acknowledging;
		self.consumer.acknowledge(end)?;
		self.stats.batches += 1;

		Ok(handled)
	}
}
