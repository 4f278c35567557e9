use super::{
	ChipVersion,
	WorkItem,
};

pub const CMD_GETINFO: u8 = 0x80;
pub const CMD_SETWORK: u8 = 0x81;
pub const CMD_REPORT: u8 = 0x82;
/// Jupiter: halt core. Neptune: set work after discarding queued work.
pub const CMD_HALT: u8 = 0x83;
pub const CMD_SETWORK_CLEAN: u8 = 0x83;

// 8'opcode 8'die 16'core
pub const HEADER_LEN: usize = 4;
// header 8'slot 6*32'zero 3*32'data[16..19] 8*32'midstate; fields go out
// highest word first, each word byte-swapped
pub const SETWORK_REQUEST_LEN: usize = 4 + 1 + 6 * 4 + 3 * 4 + 8 * 4;

const BODY_ZERO_WORDS: usize = 6;
const BODY_DATA_WORDS: usize = 3;

pub const JUPITER_REPORT_RESPONSE_LEN: usize = 1 + 1 + (1 + 4);
pub const NEPTUNE_REPORT_RESPONSE_LEN: usize = 1 + 1 + (1 + 4) * 5;

pub const JUPITER_ASIC_VERSION: u16 = 0xa001;
pub const NEPTUNE_ASIC_VERSION: u16 = 0xa002;
pub const JUPITER_MAX_CORES: u16 = 48;
pub const NEPTUNE_MAX_CORES: u16 = 360;

// 16'cores 16'version 360'want_work 8'pll
const INFO_WANT_WORK_OFFSET: usize = 4;
const INFO_PLL_OFFSET: usize = INFO_WANT_WORK_OFFSET + NEPTUNE_MAX_CORES as usize / 8;
pub const INFO_RESPONSE_LEN: usize = INFO_PLL_OFFSET + 1;

pub fn report_response_len(version: ChipVersion) -> usize {
	1 + 1 + (1 + 4) * version.nonce_count()
}

fn header(opcode: u8, die: u8, core: u16) -> [u8; HEADER_LEN] {
	let core = core.to_be_bytes();
	[opcode, die, core[0], core[1]]
}

pub fn info(die: u8) -> [u8; HEADER_LEN] {
	header(CMD_GETINFO, die, 0)
}

pub fn report(die: u8, core: u16) -> [u8; HEADER_LEN] {
	header(CMD_REPORT, die, core)
}

pub fn jupiter_halt(die: u8, core: u16) -> [u8; HEADER_LEN] {
	header(CMD_HALT, die, core)
}

// highest word first, each word byte-swapped
fn put_words(dst: &mut [u8], src: &[u8]) {
	debug_assert_eq!(dst.len(), src.len());
	debug_assert_eq!(src.len() % 4, 0);
	let words = src.len() / 4;
	for i in 0..words {
		let from = &src[(words - 1 - i) * 4..][..4];
		let to = &mut dst[i * 4..][..4];
		for b in 0..4 {
			to[b] = from[3 - b];
		}
	}
}

fn setwork(opcode: u8, die: u8, core: u16, slot: u8, work: Option<&WorkItem>) -> [u8; SETWORK_REQUEST_LEN] {
	let mut request = [0u8; SETWORK_REQUEST_LEN];
	request[..HEADER_LEN].copy_from_slice(&header(opcode, die, core));
	request[HEADER_LEN] = slot & 0x0f;

	if let Some(work) = work {
		let data_start = HEADER_LEN + 1 + BODY_ZERO_WORDS * 4;
		let midstate_start = data_start + BODY_DATA_WORDS * 4;
		put_words(&mut request[data_start..midstate_start], work.data_tail());
		put_words(&mut request[midstate_start..], work.midstate());
	}

	request
}

/// Jupiter set-work; without `work` the core gets an empty slot 0, which is
/// the first step of a halt.
pub fn jupiter_setwork(die: u8, core: u16, slot: u8, work: Option<&WorkItem>) -> [u8; SETWORK_REQUEST_LEN] {
	setwork(CMD_SETWORK, die, core, slot, work)
}

pub fn neptune_setwork(die: u8, core: u16, slot: u8, work: Option<&WorkItem>, clean: bool) -> [u8; SETWORK_REQUEST_LEN] {
	let opcode = if clean { CMD_SETWORK_CLEAN } else { CMD_SETWORK };
	setwork(opcode, die, core, slot, work)
}

/// Neptune halt: clean set-work of nothing into slot 0.
pub fn neptune_halt(die: u8, core: u16) -> [u8; SETWORK_REQUEST_LEN] {
	setwork(CMD_SETWORK_CLEAN, die, core, 0, None)
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PllStatus {
	pub power_down: bool,
	pub reset_n: bool,
	pub locked: bool,
	pub hash_reset_n: bool,
	pub bypass: bool,
}

impl PllStatus {
	fn from_bits(v: u8) -> Self {
		PllStatus {
			power_down: 0 != v & 0x80,
			reset_n: 0 != v & 0x40,
			locked: 0 != v & 0x20,
			hash_reset_n: 0 != v & 0x10,
			bypass: 0 != v & 0x08,
		}
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DieInfo {
	pub version: ChipVersion,
	pub cores: u16,
	/// Per core: has a free slot. Jupiter doesn't report it, all cores are
	/// assumed to want work.
	pub want_work: Vec<bool>,
	/// Neptune only.
	pub pll: Option<PllStatus>,
}

/// Decode a GETINFO response; `None` for unknown versions or implausible
/// core counts (no die there, or bus noise).
pub fn decode_info(response: &[u8]) -> Option<DieInfo> {
	if response.len() < INFO_WANT_WORK_OFFSET {
		return None;
	}
	let cores = u16::from_be_bytes([response[0], response[1]]);
	let version = u16::from_be_bytes([response[2], response[3]]);

	match version {
		JUPITER_ASIC_VERSION if cores <= JUPITER_MAX_CORES => Some(DieInfo {
			version: ChipVersion::Jupiter,
			cores,
			want_work: vec![true; cores as usize],
			pll: None,
		}),
		NEPTUNE_ASIC_VERSION if cores <= NEPTUNE_MAX_CORES && response.len() >= INFO_RESPONSE_LEN => {
			let want_work = (0..cores as usize)
				.map(|n| 0 != (response[INFO_WANT_WORK_OFFSET + n / 8] >> (7 - n % 8)) & 1)
				.collect();
			Some(DieInfo {
				version: ChipVersion::Neptune,
				cores,
				want_work,
				pll: Some(PllStatus::from_bits(response[INFO_PLL_OFFSET])),
			})
		},
		_ => None,
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn sample_work() -> WorkItem {
		let mut midstate = [0u8; 32];
		for (i, b) in midstate.iter_mut().enumerate() {
			*b = i as u8;
		}
		let mut data = [0u8; 76];
		for (i, b) in data[64..].iter_mut().enumerate() {
			*b = 0xa0 + i as u8;
		}
		WorkItem::new(midstate, data)
	}

	#[test]
	fn setwork_length() {
		assert_eq!(SETWORK_REQUEST_LEN, 73);
		assert_eq!(NEPTUNE_REPORT_RESPONSE_LEN, 27);
		assert_eq!(report_response_len(ChipVersion::Neptune), NEPTUNE_REPORT_RESPONSE_LEN);
		assert_eq!(report_response_len(ChipVersion::Jupiter), JUPITER_REPORT_RESPONSE_LEN);
		assert_eq!(report_response_len(ChipVersion::Unknown), 2);
	}

	#[test]
	fn setwork_layout() {
		let work = sample_work();
		let req = jupiter_setwork(3, 0x0102, 7, Some(&work));

		assert_eq!(&req[..5], &[CMD_SETWORK, 3, 0x01, 0x02, 7]);
		assert!(req[5..29].iter().all(|&b| b == 0));
		// data words 18, 17, 16, byte-swapped
		assert_eq!(&req[29..33], &[0xab, 0xaa, 0xa9, 0xa8]);
		assert_eq!(&req[37..41], &[0xa3, 0xa2, 0xa1, 0xa0]);
		// midstate word 7 first
		assert_eq!(&req[41..45], &[0x1f, 0x1e, 0x1d, 0x1c]);
		assert_eq!(&req[69..73], &[0x03, 0x02, 0x01, 0x00]);
	}

	#[test]
	fn slot_keeps_low_nibble() {
		let req = jupiter_setwork(0, 0, 0x1f, None);
		assert_eq!(req[4], 0x0f);
	}

	#[test]
	fn neptune_clean_opcode() {
		let work = sample_work();
		assert_eq!(neptune_setwork(1, 2, 3, Some(&work), false)[0], CMD_SETWORK);
		assert_eq!(neptune_setwork(1, 2, 3, Some(&work), true)[0], CMD_SETWORK_CLEAN);

		let halt = neptune_halt(1, 0x0203);
		assert_eq!(&halt[..5], &[CMD_SETWORK_CLEAN, 1, 0x02, 0x03, 0]);
		assert!(halt[5..].iter().all(|&b| b == 0));
	}

	#[test]
	fn short_frames() {
		assert_eq!(report(2, 0x0134), [CMD_REPORT, 2, 0x01, 0x34]);
		assert_eq!(jupiter_halt(2, 5), [CMD_HALT, 2, 0, 5]);
		assert_eq!(info(4), [CMD_GETINFO, 4, 0, 0]);
	}

	#[test]
	fn info_jupiter() {
		let info = decode_info(&[0x00, 0x30, 0xa0, 0x01]).unwrap();
		assert_eq!(info.version, ChipVersion::Jupiter);
		assert_eq!(info.cores, 48);
		assert_eq!(info.want_work.len(), 48);
		assert!(decode_info(&[0x00, 0x31, 0xa0, 0x01]).is_none());
	}

	#[test]
	fn info_neptune() {
		let mut resp = [0u8; INFO_RESPONSE_LEN];
		resp[..4].copy_from_slice(&[0x01, 0x68, 0xa0, 0x02]);
		resp[4] = 0b1000_0001;
		resp[INFO_PLL_OFFSET] = 0x60;
		let info = decode_info(&resp).unwrap();
		assert_eq!(info.version, ChipVersion::Neptune);
		assert_eq!(info.cores, 360);
		assert!(info.want_work[0]);
		assert!(!info.want_work[1]);
		assert!(info.want_work[7]);
		let pll = info.pll.unwrap();
		assert!(pll.reset_n && pll.locked && !pll.power_down);
	}

	#[test]
	fn info_garbage() {
		assert!(decode_info(&[0xff; INFO_RESPONSE_LEN]).is_none());
		assert!(decode_info(&[0u8; INFO_RESPONSE_LEN]).is_none());
		assert!(decode_info(&[0x00]).is_none());
	}
}
