#![no_std]

mod event;

pub use event::*;

/// Byte size of the kernel `EVENTS` ring map.
pub const RING_BYTE_SIZE: u32 = 1 << 24;
