use std::path::PathBuf;

use crate::asic::ChipVersion;
use crate::transport::SpiConfig;

pub const ENV_SPI_DEVICE: &str = "KNC_SPI_DEVICE";
pub const ENV_SPI_SPEED: &str = "KNC_SPI_SPEED";

/// Settings for one invocation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Config {
	pub spi: SpiConfig,
	/// `Unknown` means: ask the die before the first generation specific
	/// command.
	pub chip_version: ChipVersion,
	pub eeprom_root: PathBuf,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			spi: SpiConfig::default(),
			chip_version: ChipVersion::Unknown,
			eeprom_root: PathBuf::from(crate::eeprom::DEFAULT_ROOT),
		}
	}
}
