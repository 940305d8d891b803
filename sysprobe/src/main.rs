mod cli;

use std::time::Duration;

use clap::Parser;
use sysprobe::{
	config::RingConfig,
	consumer::ConsumerWorker,
	handler::LogHandler,
	ring::ring,
	simulate::Simulator,
	supervisor::Supervisor,
	Error, Result,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Cli, RunMode};

#[tokio::main]
async fn main() -> Result<()> {
	let args = Cli::parse();
	tracing_subscriber::fmt()
		.with_target(false)
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	let run_time = args.time.map(Duration::from_secs);

	match args.mode {
		RunMode::Simulate => run_simulation(&args, run_time).await,
		RunMode::Kernel => run_kernel(&args, run_time).await,
	}
}

async fn run_simulation(args: &Cli, run_time: Option<Duration>) -> Result<()> {
	let config = RingConfig::hosted(args.ring_size)?;
	let (producer, consumer) = ring(config.capacity())?;
	let ring_stats = producer.clone();

	let mut supervisor = Supervisor::new();
	supervisor.cancel_on_signal(run_time);

	let worker = ConsumerWorker::new(consumer, LogHandler);
	let token = supervisor.token();
	supervisor.spawn(async move {
		worker.run(token).await?;
		Ok::<(), Error>(())
	});

	let simulator = Simulator::start(producer, args.producers, args.rate, supervisor.token())?;
	info!(
		"simulating {} producers on a {} byte ring",
		args.producers,
		config.capacity()
	);

	supervisor.token().cancelled().await;
	let probe_stats = simulator.join();
	supervisor.shutdown().await?;

	let stats = ring_stats.stats();
	info!(
		"probe submitted={} dropped={} | ring pending={} dropped={}",
		probe_stats.submitted,
		probe_stats.dropped,
		stats.pending(),
		stats.dropped
	);

	Ok(())
}

#[cfg(feature = "kernel")]
async fn run_kernel(args: &Cli, run_time: Option<Duration>) -> Result<()> {
	use sysprobe::kernel;

	let config = RingConfig::kernel(args.ring_size)?;
	let mut ebpf = kernel::load(&config)?;
	let ringbuf_fd = kernel::attach(&mut ebpf)?;

	let mut supervisor = Supervisor::new();
	supervisor.cancel_on_signal(run_time);

	let worker = kernel::KernelRingWorker::new(ringbuf_fd, LogHandler);
	let token = supervisor.token();
	supervisor.spawn(async move {
		worker.run(token).await?;
		Ok::<(), Error>(())
	});

	supervisor.token().cancelled().await;
	supervisor.shutdown().await?;

	// keep the program attached until the worker is done draining
	drop(ebpf);
	Ok(())
}

#[cfg(not(feature = "kernel"))]
async fn run_kernel(_args: &Cli, _run_time: Option<Duration>) -> Result<()> {
	tracing::warn!("kernel mode needs a build with `--features kernel`");
	Err(Error::EbpfProgNotFound)
}
