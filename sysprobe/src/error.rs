use derive_more::{Display, From};
use flume::{RecvError, TrySendError};
use tokio::task::JoinError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, From)]
#[display("{self:?}")]
pub enum Error {
	#[from(String, &String, &str)]
	Custom(String),

	// -- Ring
	ReservationFull,
	InvalidRecordSize {
		size: usize,
		max: usize,
	},
	InvalidCapacity(usize),
	AcknowledgeOutOfRange {
		upto: u64,
		drained: u64,
	},
	AcknowledgeMisaligned {
		upto: u64,
	},

	// -- Events
	InvalidEventSize,
	HandlerFailure(String),
	ChannelClosed,
	ChannelFull,
	EventRecv(RecvError),

	// -- Kernel
	EbpfProgNotFound,
	EbpfMapNotFound,

	// -- Externals
	#[from]
	JoinError(JoinError),
	#[from]
	Io(std::io::Error),
	#[cfg(feature = "kernel")]
	AyaEbpf(aya::EbpfError),
	#[cfg(feature = "kernel")]
	AyaBtf(aya::BtfError),
	#[cfg(feature = "kernel")]
	AyaMaps(aya::maps::MapError),
	#[cfg(feature = "kernel")]
	AyaProgram(aya::programs::ProgramError),
}

impl<T> From<TrySendError<T>> for Error {
	fn from(val: TrySendError<T>) -> Self {
		match val {
			TrySendError::Full(_) => Self::ChannelFull,
			TrySendError::Disconnected(_) => Self::ChannelClosed,
		}
	}
}

impl From<RecvError> for Error {
	fn from(err: RecvError) -> Self {
		Self::EventRecv(err)
	}
}

#[cfg(feature = "kernel")]
mod aya_from {
	use super::Error;

	impl From<aya::EbpfError> for Error {
		fn from(err: aya::EbpfError) -> Self {
			Self::AyaEbpf(err)
		}
	}

	impl From<aya::BtfError> for Error {
		fn from(err: aya::BtfError) -> Self {
			Self::AyaBtf(err)
		}
	}

	impl From<aya::maps::MapError> for Error {
		fn from(err: aya::maps::MapError) -> Self {
			Self::AyaMaps(err)
		}
	}

	impl From<aya::programs::ProgramError> for Error {
		fn from(err: aya::programs::ProgramError) -> Self {
			Self::AyaProgram(err)
		}
	}
}

// region:    --- Custom

impl Error {
	pub fn custom(val: impl Into<String>) -> Self {
		Self::Custom(val.into())
	}

	pub fn handler(reason: impl Into<String>) -> Self {
		Self::HandlerFailure(reason.into())
	}
}

// endregion: --- Custom

// region:    --- Error Boilerplate

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate
