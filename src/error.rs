use std::io;

use failure::Fail;

/// Typed failures a command can end with.
///
/// Untyped errors (transport I/O, argument parsing) travel as plain
/// `failure::Error`; the binary looks for an `AsicError` anywhere in the
/// cause chain to pick the exit code.
#[derive(Debug, Fail)]
pub enum AsicError {
	#[fail(display = "KnC {}-{}: No asic found", channel, die)]
	HardwareNotFound {
		channel: u8,
		die: u8,
	},

	#[fail(display = "KnC {}-{}: Core disabled", channel, die)]
	CoreDisabled {
		channel: u8,
		die: u8,
	},

	#[fail(display = "KnC {}-{}: Core busy", channel, die)]
	CoreBusy {
		channel: u8,
		die: u8,
	},

	#[fail(display = "KnC {}-{}: Failed ({:x})", channel, die, status)]
	TransferError {
		channel: u8,
		die: u8,
		status: u8,
	},

	#[fail(display = "KnC {}-{}: Frequency change FAILED!", channel, die)]
	FrequencyChange {
		channel: u8,
		die: u8,
	},

	#[fail(display = "{}", _0)]
	Usage(String),

	#[fail(display = "Unknown command {}", _0)]
	UnknownCommand(String),

	#[fail(display = "Invalid arguments: {} takes {} argument(s), {} given", command, expected, given)]
	ArityMismatch {
		command: &'static str,
		expected: usize,
		given: usize,
	},

	#[fail(display = "Error reading {}: {}", device, cause)]
	Eeprom {
		device: String,
		#[fail(cause)]
		cause: io::Error,
	},

	#[fail(display = "{} needs {} bytes, got {}", what, expected, actual)]
	ShortBuffer {
		what: &'static str,
		expected: usize,
		actual: usize,
	},
}

impl AsicError {
	/// Fatal errors end the process with exit code 1; everything else was
	/// reported to the operator and keeps the legacy exit code 0.
	pub fn is_fatal(&self) -> bool {
		match self {
			AsicError::HardwareNotFound { .. } => true,
			AsicError::Usage(_) => true,
			AsicError::UnknownCommand(_) => true,
			AsicError::ArityMismatch { .. } => true,
			AsicError::ShortBuffer { .. } => true,
			AsicError::CoreDisabled { .. } => false,
			AsicError::CoreBusy { .. } => false,
			AsicError::TransferError { .. } => false,
			AsicError::FrequencyChange { .. } => false,
			AsicError::Eeprom { .. } => false,
		}
	}
}

/// Exit code for a failed command.
pub fn exit_code(e: &failure::Error) -> i32 {
	let typed = e.iter_chain().filter_map(|c| c.downcast_ref::<AsicError>()).next();
	match typed {
		Some(e) if !e.is_fatal() => 0,
		_ => 1,
	}
}
