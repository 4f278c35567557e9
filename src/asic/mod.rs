use std::fmt;

use crate::transfer::{
	SyncTransfer,
	Transfer,
	Verdict,
};

pub mod frame;
mod jupiter;
mod neptune;
pub mod report;

pub use self::frame::{
	DieInfo,
	PllStatus,
};
pub use self::jupiter::Jupiter;
pub use self::neptune::Neptune;
pub use self::report::{
	NonceEntry,
	ReportStatus,
	SlotState,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ChipVersion {
	Unknown,
	Jupiter,
	Neptune,
}

impl ChipVersion {
	/// Numeric version as printed by `info`.
	pub fn number(self) -> u8 {
		match self {
			ChipVersion::Unknown => 0,
			ChipVersion::Jupiter => 1,
			ChipVersion::Neptune => 2,
		}
	}

	/// Nonce slots in a report response.
	pub fn nonce_count(self) -> usize {
		match self {
			ChipVersion::Unknown => 0,
			ChipVersion::Jupiter => 1,
			ChipVersion::Neptune => 5,
		}
	}

	pub fn protocol(self) -> Option<&'static dyn ChipProtocol> {
		match self {
			ChipVersion::Unknown => None,
			ChipVersion::Jupiter => Some(&Jupiter),
			ChipVersion::Neptune => Some(&Neptune),
		}
	}
}

impl fmt::Display for ChipVersion {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let name = match self {
			ChipVersion::Unknown => "Unknown",
			ChipVersion::Jupiter => "Jupiter",
			ChipVersion::Neptune => "Neptune",
		};
		f.write_str(name)
	}
}

pub const MAX_SLOT: u8 = 15;

/// Target core. `slot` is only meaningful for work submission; halts use
/// slot 0.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Address {
	pub channel: u8,
	pub die: u8,
	pub core: u16,
	pub slot: u8,
}

impl Address {
	pub fn core(channel: u8, die: u8, core: u16) -> Self {
		Address {
			channel,
			die,
			core,
			slot: 0,
		}
	}

	pub fn with_slot(self, slot: u8) -> crate::AResult<Self> {
		ensure!(slot >= 1 && slot <= MAX_SLOT, "slot {} out of range (1-{})", slot, MAX_SLOT);
		Ok(Address { slot, ..self })
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "KnC {}-{}", self.channel, self.die)
	}
}

pub const MIDSTATE_LEN: usize = 8 * 4;
pub const DATA_LEN: usize = 16 * 4 + 3 * 4;
/// Only the block header tail past the first 64 bytes is sent to the chip.
pub const DATA_TAIL_OFFSET: usize = 16 * 4;

/// A unit of work: SHA-256 midstate plus the header data it continues on.
#[derive(Clone)]
pub struct WorkItem {
	midstate: [u8; MIDSTATE_LEN],
	data: [u8; DATA_LEN],
}

impl WorkItem {
	pub fn new(midstate: [u8; MIDSTATE_LEN], data: [u8; DATA_LEN]) -> Self {
		WorkItem {
			midstate,
			data,
		}
	}

	/// Work from the command line: full midstate and the 12-byte data tail.
	pub fn from_hex(midstate_hex: &str, data_tail_hex: &str) -> Self {
		let mut midstate = [0u8; MIDSTATE_LEN];
		let mut data = [0u8; DATA_LEN];
		crate::hex::decode(&mut midstate, midstate_hex);
		crate::hex::decode(&mut data[DATA_TAIL_OFFSET..], data_tail_hex);
		WorkItem::new(midstate, data)
	}

	pub fn midstate(&self) -> &[u8; MIDSTATE_LEN] {
		&self.midstate
	}

	pub fn data(&self) -> &[u8; DATA_LEN] {
		&self.data
	}

	pub fn data_tail(&self) -> &[u8] {
		&self.data[DATA_TAIL_OFFSET..]
	}
}

impl fmt::Debug for WorkItem {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("WorkItem")
			.field("midstate", &crate::hex::encode(&self.midstate))
			.field("data_tail", &crate::hex::encode(self.data_tail()))
			.finish()
	}
}

/// Which exchange a status belongs to; the generations check them
/// differently.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Exchange {
	SetWork,
	Report,
	Halt,
}

/// Generation specific part of the protocol.
///
/// Picked once per command from the resolved `ChipVersion`.
pub trait ChipProtocol {
	fn version(&self) -> ChipVersion;

	fn report_response_len(&self) -> usize {
		frame::report_response_len(self.version())
	}

	fn setwork_frame(&self, address: &Address, work: Option<&WorkItem>, clean: bool) -> [u8; frame::SETWORK_REQUEST_LEN];

	fn halt_frame(&self, address: &Address) -> Vec<u8>;

	fn interpret_status(&self, exchange: Exchange, transfer: &Transfer) -> Verdict;

	fn decode_report(&self, response: &[u8]) -> crate::AResult<ReportStatus> {
		report::decode(self.version(), response)
	}

	/// Queue `work`; returns the report the chip answered with, if this
	/// generation answers work submissions with one.
	fn set_work(&self, link: &mut dyn SyncTransfer, address: &Address, clean: bool, work: &WorkItem) -> crate::AResult<Option<ReportStatus>>;

	fn halt(&self, link: &mut dyn SyncTransfer, address: &Address) -> crate::AResult<()>;

	fn report(&self, link: &mut dyn SyncTransfer, address: &Address) -> crate::AResult<ReportStatus> {
		let request = frame::report(address.die, address.core);
		let transfer = link.transfer(&request, self.report_response_len())?;
		self.interpret_status(Exchange::Report, &transfer).into_result(address.channel, address.die)?;
		self.decode_report(&transfer.response)
	}
}

/// Ask the die for its version; `None` if nothing sensible answered.
pub fn detect(link: &mut dyn SyncTransfer, die: u8) -> crate::AResult<Option<DieInfo>> {
	let request = frame::info(die);
	let transfer = link.transfer(&request, frame::INFO_RESPONSE_LEN)?;
	if transfer.status.is_error() {
		debug!("KnC {}-{}: info request failed ({})", link.channel(), die, transfer.status);
		return Ok(None);
	}
	Ok(frame::decode_info(&transfer.response))
}
