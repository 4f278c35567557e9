use std::fmt;

use crate::transport::Transport;
use crate::AsicError;

pub const OP_LED: u8 = 1;
pub const OP_FREQ: u8 = 2;
pub const OP_STATUS: u8 = 3;

/// Values above this are taken as Hz instead of MHz.
pub const FREQ_HZ_THRESHOLD: u32 = 1_000_000;

// 4'op=2, 12'length, 4'bus, 4'die, 16'freq, many more clocks
const FREQ_REQUEST_BITS: usize = 4 + 12 + 16 + 4 + 4 + 16;
pub const FREQ_FRAME_LEN: usize = (FREQ_REQUEST_BITS + 1000) / 8;

const FREQ_ACCEPTED: u8 = 0xf0;
const FREQ_DONE: u8 = 0xf1;

// 4'op=3, 3'channel, 9'x -> 32'revision, 8'board_type, 8'board_revision,
// 48'reserved, 1440'core_available (360' per die)
const STATUS_REQUEST_BITS: usize = 16;
pub const DIES_PER_CHANNEL: usize = 4;
pub const CORES_PER_DIE: usize = 360;
pub const STATUS_FRAME_LEN: usize = (STATUS_REQUEST_BITS + 32 + 8 + 8 + 48 + CORES_PER_DIE * DIES_PER_CHANNEL) / 8;
const STATUS_CORES_OFFSET: usize = (STATUS_REQUEST_BITS + 32 + 8 + 8 + 48) / 8;

pub const LED_MAX: u8 = 15;

/// Accept MHz, or Hz when the value is too large to be MHz.
pub fn normalize_frequency(freq: u32) -> u32 {
	if freq > FREQ_HZ_THRESHOLD {
		freq / 1_000_000
	} else {
		freq
	}
}

pub fn freq_frame(channel: u8, die: u8, freq_mhz: u32) -> [u8; FREQ_FRAME_LEN] {
	let len_bits = FREQ_FRAME_LEN * 8;
	let mut request = [0u8; FREQ_FRAME_LEN];
	request[0] = OP_FREQ << 4 | ((len_bits >> 8) & 0x0f) as u8;
	request[1] = len_bits as u8;
	request[2] = (channel.wrapping_add(1) << 4) | (die & 0x0f);
	request[3] = (freq_mhz >> 8) as u8;
	request[4] = freq_mhz as u8;
	request
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FreqScan {
	/// Frequencies the dies acknowledged, in order.
	pub accepted: Vec<u16>,
	pub success: bool,
}

/// Walk the controller's answer: `0xf0 16'freq` per die that took the new
/// frequency, terminated by `0xf1` once the change is complete.
pub fn scan_freq_response(response: &[u8]) -> FreqScan {
	let mut accepted = Vec::new();
	let end = response.len().saturating_sub(1);
	let mut i = FREQ_REQUEST_BITS / 8;
	while i < end {
		match response[i] {
			FREQ_DONE => break,
			FREQ_ACCEPTED if i + 2 < response.len() => {
				accepted.push(u16::from_be_bytes([response[i + 1], response[i + 2]]));
				i += 2;
			},
			_ => (),
		}
		i += 1;
	}

	FreqScan {
		accepted,
		success: response.get(i) == Some(&FREQ_DONE),
	}
}

pub fn set_frequency<T: Transport + ?Sized>(transport: &mut T, channel: u8, die: u8, freq_mhz: u32) -> crate::AResult<FreqScan> {
	let request = freq_frame(channel, die, freq_mhz);
	let mut response = [0u8; FREQ_FRAME_LEN];
	transport.transfer(&request, &mut response)?;

	let scan = scan_freq_response(&response);
	for freq in &scan.accepted {
		debug!("KnC {}-{}: Accepted FREQ={}", channel, die, freq);
	}
	Ok(scan)
}

pub fn status_frame(channel: u8) -> [u8; STATUS_FRAME_LEN] {
	let mut request = [0u8; STATUS_FRAME_LEN];
	request[0] = OP_STATUS << 4 | (channel.wrapping_add(1) & 0x07) << 1;
	request
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BoardStatus {
	pub revision: u32,
	pub board_type: u8,
	pub board_revision: u8,
	/// One bit per core, per die on the channel.
	pub core_available: Vec<Vec<bool>>,
}

impl BoardStatus {
	pub fn decode(response: &[u8; STATUS_FRAME_LEN]) -> Self {
		let revision = u32::from_be_bytes([response[2], response[3], response[4], response[5]]);
		let bitmap = &response[STATUS_CORES_OFFSET..STATUS_FRAME_LEN];
		let core_available = (0..DIES_PER_CHANNEL)
			.map(|die| {
				(0..CORES_PER_DIE)
					.map(|core| {
						let bit = die * CORES_PER_DIE + core;
						0 != (bitmap[bit / 8] >> (7 - bit % 8)) & 1
					})
					.collect()
			})
			.collect();

		BoardStatus {
			revision,
			board_type: response[6],
			board_revision: response[7],
			core_available,
		}
	}
}

impl fmt::Display for BoardStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "Revision: 0x{:08x}", self.revision)?;
		writeln!(f, "Board   : type 0x{:02x} rev 0x{:02x}", self.board_type, self.board_revision)?;
		for (die, cores) in self.core_available.iter().enumerate() {
			writeln!(f, "Die {}   : {}/{} cores available", die, cores.iter().filter(|&&c| c).count(), cores.len())?;
		}
		Ok(())
	}
}

pub fn read_status<T: Transport + ?Sized>(transport: &mut T, channel: u8) -> crate::AResult<BoardStatus> {
	let request = status_frame(channel);
	let mut response = [0u8; STATUS_FRAME_LEN];
	transport.transfer(&request, &mut response)?;
	Ok(BoardStatus::decode(&response))
}

pub fn led_frame(red: u8, green: u8, blue: u8) -> crate::AResult<[u8; 2]> {
	for &(name, v) in &[("red", red), ("green", green), ("blue", blue)] {
		if v > LED_MAX {
			return Err(AsicError::Usage(format!("{} value {} out of range (0-{})", name, v, LED_MAX)).into());
		}
	}
	Ok([OP_LED << 4 | red, green << 4 | blue])
}

/// Set the I/O board LED; the controller doesn't answer.
pub fn set_led<T: Transport + ?Sized>(transport: &mut T, red: u8, green: u8, blue: u8) -> crate::AResult<()> {
	let request = led_frame(red, green, blue)?;
	let mut response = [0u8; 2];
	transport.transfer(&request, &mut response)
}
