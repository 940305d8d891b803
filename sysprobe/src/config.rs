use sysprobe_common::RING_BYTE_SIZE;

use crate::error::{Error, Result};
use crate::ring::{HDR_SZ, RECORD_ALIGN};

/// Ring capacity in bytes, fixed for the lifetime of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
	capacity: usize,
}

impl Default for RingConfig {
	fn default() -> Self {
		Self {
			capacity: RING_BYTE_SIZE as usize,
		}
	}
}

impl RingConfig {
	/// In-process ring: any multiple of the slot alignment large enough for a header pair.
	pub fn hosted(capacity: usize) -> Result<Self> {
		if capacity < 4 * HDR_SZ || capacity % RECORD_ALIGN != 0 {
			return Err(Error::InvalidCapacity(capacity));
		}
		Ok(Self { capacity })
	}

	/// `BPF_MAP_TYPE_RINGBUF`: a power of two and a multiple of the page size.
	pub fn kernel(capacity: usize) -> Result<Self> {
		let page = page_size();
		if !capacity.is_power_of_two() || capacity % page != 0 || capacity > u32::MAX as usize {
			return Err(Error::InvalidCapacity(capacity));
		}
		Ok(Self { capacity })
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}

fn page_size() -> usize {
	let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
	if size <= 0 {
		4096
	} else {
		size as usize
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn config_default_is_kernel_compatible() {
		let default = RingConfig::default();
		assert_eq!(RingConfig::kernel(default.capacity()).ok(), Some(default));
	}

	#[test]
	fn config_hosted_accepts_non_power_of_two() {
		assert_eq!(RingConfig::hosted(144).map(|c| c.capacity()).ok(), Some(144));
		assert!(RingConfig::hosted(20).is_err());
		assert!(RingConfig::hosted(150).is_err());
	}

	#[test]
	fn config_kernel_requires_power_of_two_pages() {
		assert!(RingConfig::kernel(144).is_err());
		assert!(RingConfig::kernel(1 << 12 | 1 << 13).is_err());
		assert!(RingConfig::kernel(1 << 20).is_ok());
	}
}
