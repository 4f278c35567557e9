use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::{
	AsRawFd,
	FromRawFd,
};
use std::path::PathBuf;

use libc::{
	O_CLOEXEC,
	O_RDWR,
	c_void,
	ioctl,
	open,
};

use super::Transport;

// <linux/spi/spidev.h>, _IOW('k', nr, size)
const SPI_IOC_MESSAGE_1: u32 = 0x4020_6b00;
const SPI_IOC_WR_MODE: u32 = 0x4001_6b01;
const SPI_IOC_WR_BITS_PER_WORD: u32 = 0x4001_6b03;
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = 0x4004_6b04;

// spidev refuses messages larger than its buffer (module parameter bufsiz)
const SPIDEV_BUFSIZ: usize = 4096;

#[repr(C)]
#[derive(Default)]
struct SpiIocTransfer {
	tx_buf: u64,
	rx_buf: u64,
	len: u32,
	speed_hz: u32,
	delay_usecs: u16,
	bits_per_word: u8,
	cs_change: u8,
	tx_nbits: u8,
	rx_nbits: u8,
	word_delay_usecs: u8,
	pad: u8,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpiConfig {
	pub device: PathBuf,
	pub speed_hz: u32,
	pub mode: u8,
	pub bits_per_word: u8,
}

impl Default for SpiConfig {
	fn default() -> Self {
		SpiConfig {
			device: PathBuf::from("/dev/spidev1.0"),
			speed_hz: 2_000_000,
			mode: 0,
			bits_per_word: 8,
		}
	}
}

/// An open spidev node; the descriptor is released when this is dropped.
#[derive(Debug)]
pub struct SpiTransport {
	file: fs::File,
	config: SpiConfig,
}

fn check_ioctl(res: libc::c_int) -> io::Result<()> {
	if res < 0 {
		Err(io::Error::last_os_error())
	} else {
		Ok(())
	}
}

impl SpiTransport {
	pub fn open(config: &SpiConfig) -> crate::AResult<Self> {
		with_context!(("open SPI device {}", config.device.display()), {
			let path = CString::new(config.device.to_string_lossy().into_owned())?;

			let fd = unsafe { open(path.as_ptr(), O_RDWR | O_CLOEXEC) };
			if -1 == fd {
				return Err(io::Error::last_os_error().into());
			}
			// now get fd managed to prevent resource leak
			let file = unsafe { fs::File::from_raw_fd(fd) };

			unsafe {
				check_ioctl(ioctl(fd, SPI_IOC_WR_MODE as _, &config.mode as *const u8))?;
				check_ioctl(ioctl(fd, SPI_IOC_WR_BITS_PER_WORD as _, &config.bits_per_word as *const u8))?;
				check_ioctl(ioctl(fd, SPI_IOC_WR_MAX_SPEED_HZ as _, &config.speed_hz as *const u32))?;
			}

			debug!("opened {} ({} Hz, mode {})", config.device.display(), config.speed_hz, config.mode);

			Ok(SpiTransport {
				file,
				config: config.clone(),
			})
		})
	}

	pub fn config(&self) -> &SpiConfig {
		&self.config
	}
}

impl Drop for SpiTransport {
	fn drop(&mut self) {
		debug!("closing {}", self.config.device.display());
	}
}

impl Transport for SpiTransport {
	fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> crate::AResult<()> {
		ensure!(tx.len() == rx.len(), "SPI transfer needs equal buffers ({} != {})", tx.len(), rx.len());
		ensure!(tx.len() <= SPIDEV_BUFSIZ, "SPI transfer of {} bytes exceeds {}", tx.len(), SPIDEV_BUFSIZ);
		if tx.is_empty() {
			return Ok(());
		}

		let xfer = SpiIocTransfer {
			tx_buf: tx.as_ptr() as u64,
			rx_buf: rx.as_mut_ptr() as u64,
			len: tx.len() as u32,
			speed_hz: self.config.speed_hz,
			bits_per_word: self.config.bits_per_word,
			..SpiIocTransfer::default()
		};

		trace!("spi tx {}", crate::hex::encode(tx));
		let res = unsafe {
			ioctl(self.file.as_raw_fd(), SPI_IOC_MESSAGE_1 as _, &xfer as *const SpiIocTransfer as *const c_void)
		};
		if res < 0 {
			let e = io::Error::last_os_error();
			bail!("SPI transfer on {} failed: {}", self.config.device.display(), e);
		}
		trace!("spi rx {}", crate::hex::encode(rx));

		Ok(())
	}
}
