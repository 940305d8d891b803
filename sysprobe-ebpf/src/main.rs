#![no_std]
#![no_main]

use core::ptr::addr_of;

use aya_ebpf::{
	helpers::{bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_task, bpf_ktime_get_ns, bpf_probe_read_kernel},
	macros::{fentry, map},
	maps::RingBuf,
	programs::FEntryContext,
};
use sysprobe_common::{SyscallEvent, RING_BYTE_SIZE, TASK_COMM_LEN};
mod vmlinux;
use vmlinux::task_struct;

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(RING_BYTE_SIZE, 0);

// linux/arch/x86/entry/syscall_64.c
// long x64_sys_call(const struct pt_regs *regs, unsigned int nr)
#[fentry(function = "x64_sys_call")]
pub fn hook_x64_sys_call(ctx: FEntryContext) -> i32 {
	match try_hook_x64_sys_call(ctx) {
		Ok(ret) => ret,
		Err(ret) => ret,
	}
}

fn try_hook_x64_sys_call(ctx: FEntryContext) -> Result<i32, i32> {
	// ring full: drop this event, never stall the syscall
	let Some(mut entry) = EVENTS.reserve::<SyscallEvent>(0) else {
		return Ok(0);
	};

	let nr: u32 = unsafe { ctx.arg(1) };
	let event = unsafe { &mut *entry.as_mut_ptr() };

	event.timestamp = unsafe { bpf_ktime_get_ns() };
	event.syscall_nr = nr;
	event.pid = (bpf_get_current_pid_tgid() >> 32) as u32;
	event.ppid = parent_tgid().unwrap_or(0);
	event.comm = bpf_get_current_comm().unwrap_or([0u8; TASK_COMM_LEN]);
	event._padding = 0;

	entry.submit(0);

	Ok(0)
}

// task->real_parent->tgid, read without holding any lock
fn parent_tgid() -> Option<u32> {
	let task = unsafe { bpf_get_current_task() } as *const task_struct;
	if task.is_null() {
		return None;
	}

	let parent = unsafe { bpf_probe_read_kernel(addr_of!((*task).real_parent)).ok()? };
	if parent.is_null() {
		return None;
	}

	let tgid = unsafe { bpf_probe_read_kernel(addr_of!((*parent).tgid)).ok()? };
	if tgid > 0 {
		Some(tgid as u32)
	} else {
		None
	}
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
	loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
