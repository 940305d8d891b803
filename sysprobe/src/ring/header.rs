//! Slot header encoding.
//!
//! Every slot starts with an 8 byte header whose first word holds the payload
//! length and the slot state. A zero word means nothing was published there yet.

pub(crate) const HDR_SZ: usize = 8;
pub(crate) const RECORD_ALIGN: usize = 8;

const BUSY_BIT: u32 = 1 << 31;
const DISCARD_BIT: u32 = 1 << 30;
const READY_BIT: u32 = 1 << 29;

pub(crate) const LEN_MASK: u32 = READY_BIT - 1;

/// Bytes a payload of `len` occupies in the ring, header included.
pub(crate) const fn slot_size(len: usize) -> usize {
	HDR_SZ + (len + RECORD_ALIGN - 1) / RECORD_ALIGN * RECORD_ALIGN
}

pub(crate) const fn busy(len: usize) -> u32 {
	BUSY_BIT | len as u32
}

pub(crate) const fn committed(len: usize) -> u32 {
	READY_BIT | len as u32
}

pub(crate) const fn discarded(len: usize) -> u32 {
	READY_BIT | DISCARD_BIT | len as u32
}

/// Filler covering `span` bytes up to the physical end of the region.
pub(crate) const fn padding(span: usize) -> u32 {
	discarded(span - HDR_SZ)
}

pub(crate) const fn is_settled(word: u32) -> bool {
	word & READY_BIT != 0 && word & BUSY_BIT == 0
}

pub(crate) const fn is_record(word: u32) -> bool {
	is_settled(word) && word & DISCARD_BIT == 0
}

pub(crate) const fn len(word: u32) -> usize {
	(word & LEN_MASK) as usize
}

// region:    --- Tests


// endregion: --- Tests
