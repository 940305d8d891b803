//! Privilege-free producer side: worker threads issue real syscalls and report
//! each one through the hosted probe.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::probe::{HostTaskSource, Probe, ProbeStats, SyscallArgs};
use crate::ring::RingProducer;

// (nr, issue) pairs cycled by every producer thread
const SYSCALLS: [(libc::c_long, fn()); 3] = [
	(libc::SYS_getpid, issue_getpid),
	(libc::SYS_getppid, issue_getppid),
	(libc::SYS_sched_yield, issue_sched_yield),
];

fn issue_getpid() {
	unsafe { libc::getpid() };
}

fn issue_getppid() {
	unsafe { libc::getppid() };
}

fn issue_sched_yield() {
	unsafe { libc::sched_yield() };
}

pub struct Simulator {
	probe: Arc<Probe<HostTaskSource>>,
	workers: Vec<JoinHandle<()>>,
}

impl Simulator {
	/// Spawns `producers` threads. `rate` is syscalls per second per thread, 0 for unthrottled.
	pub fn start(producer: RingProducer, producers: usize, rate: u64, shutdown: CancellationToken) -> Result<Self> {
		let probe = Arc::new(Probe::new(producer, HostTaskSource));
		let pause = (rate > 0).then(|| Duration::from_nanos(1_000_000_000 / rate));

		let workers = (0..producers)
			.map(|idx| {
				let probe = probe.clone();
				let shutdown = shutdown.clone();
				thread::Builder::new()
					.name(format!("sysprobe-sim-{idx}"))
					.spawn(move || produce(&probe, pause, &shutdown))
			})
			.collect::<std::io::Result<Vec<_>>>()?;

		debug!("started {producers} simulated producers");
		Ok(Self { probe, workers })
	}

	/// Waits for every producer thread; call after the shutdown token fired.
	pub fn join(self) -> ProbeStats {
		let panicked = join_producers(self.workers);
		if panicked > 0 {
			warn!("{panicked} simulated producers panicked, stats are partial");
		}
		self.probe.stats()
	}
}

// Returns how many threads panicked.
fn join_producers(workers: Vec<JoinHandle<()>>) -> usize {
	let mut panicked = 0;
	for worker in workers {
		let name = worker.thread().name().unwrap_or("producer").to_string();
		if worker.join().is_err() {
			warn!("{name} panicked");
			panicked += 1;
		}
	}
	panicked
}

fn produce(probe: &Probe<HostTaskSource>, pause: Option<Duration>, shutdown: &CancellationToken) {
	let args: SyscallArgs = [0; 6];
	for (nr, issue) in SYSCALLS.iter().cycle() {
		if shutdown.is_cancelled() {
			break;
		}
		probe.on_syscall_enter(&args, *nr as u32);
		issue();

		if let Some(pause) = pause {
			thread::sleep(pause);
		}
	}
}
