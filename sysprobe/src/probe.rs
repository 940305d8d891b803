//! Syscall-entry producer.
//!
//! `Probe::on_syscall_enter` is the hosted counterpart of the eBPF program in
//! `sysprobe-ebpf`: reserve one `SyscallEvent`, fill it in place, commit. It never
//! allocates and never waits; a full ring drops the event.

use std::sync::atomic::{AtomicU64, Ordering};

use sysprobe_common::{SyscallEvent, TASK_COMM_LEN};

use crate::ring::RingProducer;

/// Raw argument registers at syscall entry. The probe only records the number.
pub type SyscallArgs = [u64; 6];

/// Live task state read at capture time.
pub trait TaskSource {
	fn monotonic_ns(&self) -> u64;
	fn pid(&self) -> u32;
	/// Best-effort. May already be stale when read.
	fn ppid(&self) -> u32;
	fn comm(&self) -> [u8; TASK_COMM_LEN];
}

/// Reads the calling thread's own process through libc.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostTaskSource;

impl TaskSource for HostTaskSource {
	fn monotonic_ns(&self) -> u64 {
		let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
		let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
		if ret != 0 {
			return 0;
		}
		ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
	}

	fn pid(&self) -> u32 {
		unsafe { libc::getpid() as u32 }
	}

	fn ppid(&self) -> u32 {
		unsafe { libc::getppid() as u32 }
	}

	fn comm(&self) -> [u8; TASK_COMM_LEN] {
		let mut comm = [0u8; TASK_COMM_LEN];
		let ret = unsafe { libc::prctl(libc::PR_GET_NAME, comm.as_mut_ptr() as libc::c_ulong, 0, 0, 0) };
		if ret != 0 {
			return [0u8; TASK_COMM_LEN];
		}
		// PR_GET_NAME always null terminates
		comm[TASK_COMM_LEN - 1] = 0;
		comm
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
	Submitted,
	Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
	pub submitted: u64,
	pub dropped: u64,
}

pub struct Probe<S> {
	producer: RingProducer,
	source: S,
	submitted: AtomicU64,
	dropped: AtomicU64,
}

impl<S: TaskSource> Probe<S> {
	pub fn new(producer: RingProducer, source: S) -> Self {
		Self {
			producer,
			source,
			submitted: AtomicU64::new(0),
			dropped: AtomicU64::new(0),
		}
	}

	/// Captures one syscall entry. Always returns; a full ring only bumps the drop counter.
	pub fn on_syscall_enter(&self, _args: &SyscallArgs, nr: u32) -> ProbeOutcome {
		let Ok(mut slot) = self.producer.reserve(SyscallEvent::SIZE) else {
			self.dropped.fetch_add(1, Ordering::Relaxed);
			return ProbeOutcome::Dropped;
		};

		let Ok(event) = slot.as_event_mut::<SyscallEvent>() else {
			slot.discard();
			self.dropped.fetch_add(1, Ordering::Relaxed);
			return ProbeOutcome::Dropped;
		};

		event.timestamp = self.source.monotonic_ns();
		event.syscall_nr = nr;
		event.pid = self.source.pid();
		event.ppid = self.source.ppid();
		event.comm = self.source.comm();
		event._padding = 0;

		slot.submit();
		self.submitted.fetch_add(1, Ordering::Relaxed);
		ProbeOutcome::Submitted
	}

	pub fn stats(&self) -> ProbeStats {
		ProbeStats {
			submitted: self.submitted.load(Ordering::Relaxed),
			dropped: self.dropped.load(Ordering::Relaxed),
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use std::sync::atomic::AtomicU64;

	use super::*;
	use crate::ring::ring;

	/// Deterministic task state: every read of the clock advances it by one.
	pub(crate) struct FakeTask {
		pub clock: AtomicU64,
		pub pid: u32,
		pub ppid: u32,
		pub comm: [u8; TASK_COMM_LEN],
	}

	impl FakeTask {
		pub(crate) fn new(pid: u32, ppid: u32, name: &str) -> Self {
			let mut comm = [0u8; TASK_COMM_LEN];
			let len = name.len().min(TASK_COMM_LEN - 1);
			comm[..len].copy_from_slice(&name.as_bytes()[..len]);
			Self {
				clock: AtomicU64::new(1),
				pid,
				ppid,
				comm,
			}
		}
	}

	impl TaskSource for FakeTask {
		fn monotonic_ns(&self) -> u64 {
			self.clock.fetch_add(1, Ordering::Relaxed)
		}

		fn pid(&self) -> u32 {
			self.pid
		}

		fn ppid(&self) -> u32 {
			self.ppid
		}

		fn comm(&self) -> [u8; TASK_COMM_LEN] {
			self.comm
		}
	}

	#[test]
	fn probe_fills_every_field() -> Result<()> {
		// -- Setup & Fixtures
		let (producer, mut consumer) = ring(1024)?;
		let probe = Probe::new(producer, FakeTask::new(100, 1, "bash"));

		// -- Exec
		let outcome = probe.on_syscall_enter(&[0; 6], 59);

		// -- Check
		assert_eq!(outcome, ProbeOutcome::Submitted);
		let batch = consumer.drain();
		let event: &SyscallEvent = batch.iter().next().ok_or("missing record")?.event()?;
		assert_eq!(event.timestamp, 1);
		assert_eq!(event.syscall_nr, 59);
		assert_eq!(event.pid, 100);
		assert_eq!(event.ppid, 1);
		assert_eq!(event.comm_bytes(), b"bash");
		Ok(())
	}

	#[test]
	fn probe_drops_newest_when_full() -> Result<()> {
		// -- Setup & Fixtures
		// room for exactly two 48 byte slots
		let (producer, mut consumer) = ring(96)?;
		let probe = Probe::new(producer, FakeTask::new(1, 0, "init"));

		// -- Exec
		let outcomes: Vec<_> = (0..4).map(|nr| probe.on_syscall_enter(&[0; 6], nr)).collect();

		// -- Check
		assert_eq!(
			outcomes,
			vec![
				ProbeOutcome::Submitted,
				ProbeOutcome::Submitted,
				ProbeOutcome::Dropped,
				ProbeOutcome::Dropped
			]
		);
		assert_eq!(probe.stats(), ProbeStats { submitted: 2, dropped: 2 });

		// the oldest records survive, not the newest
		let batch = consumer.drain();
		let nrs: Vec<u32> = batch
			.iter()
			.map(|r| r.event::<SyscallEvent>().map(|e| e.syscall_nr))
			.collect::<core::result::Result<_, _>>()?;
		assert_eq!(nrs, vec![0, 1]);
		Ok(())
	}

	#[test]
	fn probe_host_source_reads_own_process() {
		let source = HostTaskSource;
		assert_eq!(source.pid(), std::process::id());
		assert!(source.monotonic_ns() > 0);
		let a = source.monotonic_ns();
		let b = source.monotonic_ns();
		assert!(b >= a);
	}
}
