use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Kernel task name width, `TASK_COMM_LEN`.
pub const TASK_COMM_LEN: usize = 16;

/// One captured syscall entry. Shared layout between the probe and userspace.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SyscallEvent {
	pub timestamp: u64, // CLOCK_MONOTONIC ns, only ordered per CPU
	pub syscall_nr: u32,
	pub pid: u32,
	pub ppid: u32, // best-effort, read without holding any task lock
	pub comm: [u8; TASK_COMM_LEN],
	pub _padding: u32,
}

impl SyscallEvent {
	pub const SIZE: usize = core::mem::size_of::<Self>();

	/// Task name up to the first null byte.
	pub fn comm_bytes(&self) -> &[u8] {
		let len = self.comm.iter().position(|&b| b == 0).unwrap_or(TASK_COMM_LEN);
		&self.comm[..len]
	}
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SyscallEvent {}

const _: () = assert!(SyscallEvent::SIZE == 40);
