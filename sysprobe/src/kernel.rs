//! Kernel rendition: loads the `fentry/x64_sys_call` probe and drains its ring map.

use aya::{
	maps::{MapData, RingBuf},
	programs::FEntry,
	Btf, Ebpf, EbpfLoader,
};
use sysprobe_common::SyscallEvent;
use tokio::io::unix::AsyncFd;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zerocopy::FromBytes;

use crate::config::RingConfig;
use crate::consumer::ConsumerStats;
use crate::error::{Error, Result};
use crate::handler::RecordHandler;

const PROGRAM_NAME: &str = "hook_x64_sys_call";
const ATTACH_FN: &str = "x64_sys_call";
const RING_MAP: &str = "EVENTS";

pub fn load(ring: &RingConfig) -> Result<Ebpf> {
	// Bump the memlock rlimit. This is needed for older kernels that don't use the
	// new memcg based accounting, see https://lwn.net/Articles/837122/
	let rlim = libc::rlimit {
		rlim_cur: libc::RLIM_INFINITY,
		rlim_max: libc::RLIM_INFINITY,
	};
	let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
	if ret != 0 {
		debug!("remove limit on locked memory failed, ret is: {ret}");
	}

	let mut ebpf = EbpfLoader::new()
		.set_max_entries(RING_MAP, ring.capacity() as u32)
		.load(aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/sysprobe")))?;

	if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
		// This can happen if you remove all log statements from your eBPF program.
		warn!("failed to initialize eBPF logger: {e}");
	}

	Ok(ebpf)
}

pub fn attach(ebpf: &mut Ebpf) -> Result<AsyncFd<RingBuf<MapData>>> {
	let btf = Btf::from_sys_fs()?;
	let program: &mut FEntry = ebpf.program_mut(PROGRAM_NAME).ok_or(Error::EbpfProgNotFound)?.try_into()?;
	program.load(ATTACH_FN, &btf)?;
	program.attach()?;
	info!("attached {PROGRAM_NAME} to fentry/{ATTACH_FN}");

	let ring_buf = RingBuf::try_from(ebpf.take_map(RING_MAP).ok_or(Error::EbpfMapNotFound)?)?;
	let fd = AsyncFd::new(ring_buf)?;
	Ok(fd)
}

pub struct KernelRingWorker<H> {
	ringbuf_fd: AsyncFd<RingBuf<MapData>>,
	handler: H,
	stats: ConsumerStats,
}

impl<H: RecordHandler> KernelRingWorker<H> {
	pub fn new(ringbuf_fd: AsyncFd<RingBuf<MapData>>, handler: H) -> Self {
		Self {
			ringbuf_fd,
			handler,
			stats: ConsumerStats::default(),
		}
	}

	pub async fn run(mut self, shutdown: CancellationToken) -> Result<ConsumerStats> {
		loop {
			tokio::select! {
				biased;
				_ = shutdown.cancelled() => break,
				guard = self.ringbuf_fd.readable_mut() => {
					let mut guard = guard?;
					drain_ring(guard.get_inner_mut(), &mut self.handler, &mut self.stats, true);
					guard.clear_ready();
				}
			}
		}

		drain_ring(self.ringbuf_fd.get_mut(), &mut self.handler, &mut self.stats, false);
		info!(
			"kernel consumer stopped: processed={} handler_failures={} invalid={}",
			self.stats.processed, self.stats.handler_failures, self.stats.invalid_records
		);

		Ok(self.stats)
	}
}

// Each item is acknowledged back to the kernel when it is dropped.
fn drain_ring<H: RecordHandler>(ring_buf: &mut RingBuf<MapData>, handler: &mut H, stats: &mut ConsumerStats, woken: bool) {
	let mut handled = 0u64;
	while let Some(item) = ring_buf.next() {
		handled += 1;
		let event = match SyscallEvent::read_from_bytes(&item) {
			Ok(event) => event,
			Err(_) => {
				stats.invalid_records += 1;
				warn!("skipping record of {} bytes", item.len());
				continue;
			}
		};

		match handler.handle(&event) {
			Ok(()) => stats.processed += 1,
			Err(err) => {
				stats.handler_failures += 1;
				warn!("handler failed for pid {}: {err}", event.pid);
			}
		}
	}

	if handled > 0 {
		stats.batches += 1;
	} else if woken {
		stats.spurious_wakes += 1;
	}
}
