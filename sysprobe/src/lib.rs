// region:    --- Modules
mod error;

pub mod config;
pub mod consumer;
pub mod handler;
#[cfg(feature = "kernel")]
pub mod kernel;
pub mod probe;
pub mod ring;
pub mod simulate;
pub mod supervisor;
// endregion: --- Modules

pub use self::error::{Error, Result};
pub use sysprobe_common::{SyscallEvent, RING_BYTE_SIZE, TASK_COMM_LEN};
