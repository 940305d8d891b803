use flume::{Receiver, Sender};
use syscalls::Sysno;
use sysprobe_common::SyscallEvent;
use tracing::info;

use crate::error::{Error, Result};

/// Receives every drained event exactly once, in commit order.
///
/// An error is reported by the caller and never stops the drain.
pub trait RecordHandler {
	fn handle(&mut self, event: &SyscallEvent) -> Result<()>;
}

impl<F> RecordHandler for F
where
	F: FnMut(&SyscallEvent) -> Result<()>,
{
	fn handle(&mut self, event: &SyscallEvent) -> Result<()> {
		self(event)
	}
}

pub fn syscall_name(nr: u32) -> Option<&'static str> {
	Sysno::new(nr as usize).map(|sysno| sysno.name())
}

/// Writes one `info!` line per event.
#[derive(Debug, Default)]
pub struct LogHandler;

impl RecordHandler for LogHandler {
	fn handle(&mut self, event: &SyscallEvent) -> Result<()> {
		let comm = String::from_utf8_lossy(event.comm_bytes());
		match syscall_name(event.syscall_nr) {
			Some(name) => info!(
				"[{}] {} ({}) | PID:{} | PPID:{} | CMD:{}",
				event.timestamp, name, event.syscall_nr, event.pid, event.ppid, comm
			),
			None => info!(
				"[{}] sys_{} | PID:{} | PPID:{} | CMD:{}",
				event.timestamp, event.syscall_nr, event.pid, event.ppid, comm
			),
		}
		Ok(())
	}
}

/// Forwards events to another task without waiting.
///
/// A full channel fails the record instead of stalling the drain.
#[derive(Clone)]
pub struct ChannelHandler {
	tx: Sender<SyscallEvent>,
}

impl RecordHandler for ChannelHandler {
	fn handle(&mut self, event: &SyscallEvent) -> Result<()> {
		self.tx.try_send(*event).map_err(Error::from)
	}
}

pub struct EventRx {
	rx: Receiver<SyscallEvent>,
}

impl EventRx {
	pub async fn recv(&self) -> Result<SyscallEvent> {
		let res = self.rx.recv_async().await?;
		Ok(res)
	}

	pub fn try_iter(&self) -> impl Iterator<Item = SyscallEvent> + '_ {
		self.rx.try_iter()
	}
}

pub fn new_event_channel(bound: usize) -> (ChannelHandler, EventRx) {
	let (tx, rx) = flume::bounded::<SyscallEvent>(bound);

	(ChannelHandler { tx }, EventRx { rx })
}
