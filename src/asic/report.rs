use std::fmt;

use super::ChipVersion;
use crate::AsicError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SlotState {
	Loaded,
	Free,
}

impl fmt::Display for SlotState {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			SlotState::Loaded => f.write_str("LOADED"),
			SlotState::Free => f.write_str("FREE"),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NonceEntry {
	pub core_select: u8,
	pub nonce: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReportStatus {
	pub version: ChipVersion,
	pub next_state: SlotState,
	/// Neptune only.
	pub next_slot: Option<u8>,
	pub current_slot: u8,
	/// Neptune only.
	pub hashing: Option<bool>,
	pub progress: u8,
	pub nonces: Vec<NonceEntry>,
}

// byte 0: 2'x 1'next_loaded 1'hashing(N) 4'next_slot(N)
// byte 1: progress, top byte of the 32-bit nonce counter
// then per nonce: 4'current_slot(first entry only) 4'core_select 32'nonce
// (N): Neptune only
pub fn decode(version: ChipVersion, response: &[u8]) -> crate::AResult<ReportStatus> {
	ensure!(version != ChipVersion::Unknown, "can't decode a report for an unknown chip version");

	let expected = super::frame::report_response_len(version);
	if response.len() < expected {
		return Err(AsicError::ShortBuffer {
			what: "report response",
			expected,
			actual: response.len(),
		}.into());
	}

	let next_state = if 0 != response[0] & 0x20 { SlotState::Loaded } else { SlotState::Free };
	let (next_slot, hashing) = match version {
		ChipVersion::Neptune => (Some(response[0] & 0x0f), Some(0 != response[0] & 0x10)),
		_ => (None, None),
	};

	let nonces = (0..version.nonce_count())
		.map(|n| {
			let entry = &response[2 + n * 5..][..5];
			NonceEntry {
				core_select: entry[0] & 0x0f,
				nonce: u32::from_be_bytes([entry[1], entry[2], entry[3], entry[4]]),
			}
		})
		.collect();

	Ok(ReportStatus {
		version,
		next_state,
		next_slot,
		current_slot: response[2] >> 4,
		hashing,
		progress: response[1],
		nonces,
	})
}

impl fmt::Display for ReportStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.next_slot {
			Some(slot) => writeln!(f, "Next    : 0x{:x} {}", slot, self.next_state)?,
			None => writeln!(f, "Next    : {}", self.next_state)?,
		}
		match self.hashing {
			Some(hashing) => writeln!(f, "Current : 0x{:x} {}", self.current_slot, if hashing { "HASHING" } else { "IDLE" })?,
			None => writeln!(f, "Current : 0x{:x}", self.current_slot)?,
		}
		// only the top byte of the progress counter is reported
		writeln!(f, "Progress: 0x{:02x}xxxxxx", self.progress)?;
		for (n, entry) in self.nonces.iter().enumerate() {
			writeln!(f, "Nonce {} : 0x{:x} {:08x}", n, entry.core_select, entry.nonce)?;
		}
		Ok(())
	}
}
