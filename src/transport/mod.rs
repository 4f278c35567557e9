mod mock;
mod spidev;

pub use self::mock::{
	MockTransport,
	Reply,
};

pub use self::spidev::{
	SpiConfig,
	SpiTransport,
};

/// Placeholder for commands that run without the controller; every
/// transfer fails.
#[derive(Clone, Copy, Default, Debug)]
pub struct NoDevice;

impl Transport for NoDevice {
	fn transfer(&mut self, _tx: &[u8], _rx: &mut [u8]) -> crate::AResult<()> {
		bail!("no SPI device opened for this command")
	}
}

pub trait Transport {
	/// Clock out `tx` while reading the same number of bytes into `rx`.
	fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> crate::AResult<()>;
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> crate::AResult<()> {
		T::transfer(*self, tx, rx)
	}
}

impl<T: ?Sized + Transport> Transport for Box<T> {
	fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> crate::AResult<()> {
		T::transfer(&mut **self, tx, rx)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn no_device_refuses_transfers() {
		let mut rx = [0u8; 2];
		assert!(NoDevice.transfer(&[0x11, 0x23], &mut rx).is_err());
	}
}
