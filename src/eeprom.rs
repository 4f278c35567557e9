use std::fmt;
use std::fs;
use std::io::{
	self,
	Read,
};
use std::path::{
	Path,
	PathBuf,
};

use crate::AsicError;

pub const MAX_ASICS: i32 = 6;
const FIRST_ASIC_I2C_BUS: i32 = 3;
const ASIC_EEPROM_ADDRESS: u8 = 0x50;
const CONTROL_BOARD_I2C_BUS: i32 = 2;
const CONTROL_BOARD_EEPROM_ADDRESS: u8 = 0x54;
const BASEBOARD_I2C_BUS: i32 = 0;
const BASEBOARD_EEPROM_ADDRESS: u8 = 0x50;

pub const RECORD_LEN: usize = 256;

pub const DEFAULT_ROOT: &str = "/sys/bus/i2c/devices";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Selector {
	/// ASIC board by port index.
	Asic(u8),
	ControlBoard,
	Baseboard,
}

impl Selector {
	/// `0..MAX_ASICS` select an ASIC board, `-1` the control board, `-2` the
	/// baseboard.
	pub fn from_index(index: i32) -> crate::AResult<Self> {
		match index {
			-1 => Ok(Selector::ControlBoard),
			-2 => Ok(Selector::Baseboard),
			n if n >= 0 && n < MAX_ASICS => Ok(Selector::Asic(n as u8)),
			n => bail!("Wrong port {}", n),
		}
	}

	fn bus_and_address(self) -> (i32, u8) {
		match self {
			Selector::Asic(n) => (FIRST_ASIC_I2C_BUS + n as i32, ASIC_EEPROM_ADDRESS),
			Selector::ControlBoard => (CONTROL_BOARD_I2C_BUS, CONTROL_BOARD_EEPROM_ADDRESS),
			Selector::Baseboard => (BASEBOARD_I2C_BUS, BASEBOARD_EEPROM_ADDRESS),
		}
	}

	pub fn path(self, root: &Path) -> PathBuf {
		let (bus, address) = self.bus_and_address();
		root.join(format!("{}-{:04x}", bus, address)).join("eeprom")
	}
}

impl fmt::Display for Selector {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Selector::Asic(n) => write!(f, "ASIC board {}", n),
			Selector::ControlBoard => f.write_str("control board"),
			Selector::Baseboard => f.write_str("baseboard"),
		}
	}
}

#[derive(Clone)]
pub struct EepromRecord {
	pub data: [u8; RECORD_LEN],
}

impl fmt::Debug for EepromRecord {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("EepromRecord")
			.field("data", &crate::hex::encode(&self.data))
			.finish()
	}
}

impl fmt::Display for EepromRecord {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for (i, b) in self.data.iter().enumerate() {
			if 0 == i % 16 {
				write!(f, "{:08x} ", i)?;
			} else if 0 == i % 8 {
				write!(f, " ")?;
			}
			write!(f, " {:02x}", b)?;
			if 15 == i % 16 {
				writeln!(f)?;
			}
		}
		Ok(())
	}
}

fn read_record<R: Read>(mut r: R) -> io::Result<EepromRecord> {
	let mut data = [0u8; RECORD_LEN];
	r.read_exact(&mut data)?;
	Ok(EepromRecord { data })
}

pub fn read_path(path: &Path) -> crate::AResult<EepromRecord> {
	let result = fs::File::open(path).and_then(read_record);
	result.map_err(|cause| {
		AsicError::Eeprom {
			device: path.display().to_string(),
			cause,
		}.into()
	})
}

pub fn read(root: &Path, selector: Selector) -> crate::AResult<EepromRecord> {
	let path = selector.path(root);
	debug!("reading {} EEPROM from {}", selector, path.display());
	read_path(&path)
}
