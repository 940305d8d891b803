use clap::{Parser, ValueEnum};
use sysprobe_common::RING_BYTE_SIZE;

#[derive(Parser, Debug)]
#[command(name = "sysprobe", about = "Stream syscall-entry events through a ring buffer")]
pub struct Cli {
	#[arg(long, value_enum, default_value = "simulate", env = "SYSPROBE_MODE")]
	pub mode: RunMode,

	/// Ring capacity in bytes
	#[arg(long, default_value_t = RING_BYTE_SIZE as usize, env = "SYSPROBE_RING_SIZE")]
	pub ring_size: usize,

	/// Stop after this many seconds instead of waiting for Ctrl-C
	#[arg(long)]
	pub time: Option<u64>,

	/// Simulated producer threads
	#[arg(long, default_value_t = 4)]
	pub producers: usize,

	/// Simulated syscalls per second per producer, 0 for unthrottled
	#[arg(long, default_value_t = 1000)]
	pub rate: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
	/// Attach the eBPF probe to the running kernel
	Kernel,
	/// Drive the in-process ring from local producer threads
	Simulate,
}
