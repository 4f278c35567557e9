use std::convert::TryFrom;
use std::io::Write;
use std::path::PathBuf;

use crate::asic::{
	self,
	Address,
	ChipProtocol,
	ChipVersion,
	DieInfo,
	WorkItem,
};
use crate::board;
use crate::eeprom;
use crate::hex;
use crate::transfer::{
	Channel,
	SyncTransfer,
};
use crate::transport::Transport;
use crate::AsicError;

const RAW_MAX_LEN: usize = 256;

/// State for running one command against one die.
pub struct Context<'a> {
	link: Channel<&'a mut dyn Transport>,
	die: u8,
	version: ChipVersion,
	eeprom_root: PathBuf,
	out: &'a mut dyn Write,
}

impl<'a> Context<'a> {
	pub fn new(transport: &'a mut dyn Transport, channel: u8, die: u8, out: &'a mut dyn Write) -> Self {
		Context {
			link: Channel::new(transport, channel),
			die,
			version: ChipVersion::Unknown,
			eeprom_root: PathBuf::from(eeprom::DEFAULT_ROOT),
			out,
		}
	}

	/// Skip detection and use this chip version.
	pub fn with_version(mut self, version: ChipVersion) -> Self {
		self.version = version;
		self
	}

	pub fn with_eeprom_root(mut self, root: PathBuf) -> Self {
		self.eeprom_root = root;
		self
	}

	pub fn channel(&self) -> u8 {
		self.link.channel()
	}

	pub fn version(&self) -> ChipVersion {
		self.version
	}

	fn core_address(&self, core: u16) -> Address {
		Address::core(self.channel(), self.die, core)
	}

	fn detect(&mut self) -> crate::AResult<DieInfo> {
		match asic::detect(&mut self.link, self.die)? {
			Some(info) => Ok(info),
			None => Err(AsicError::HardwareNotFound {
				channel: self.channel(),
				die: self.die,
			}.into()),
		}
	}

	/// Protocol for the die's generation, asking the die once if the
	/// version wasn't given.
	pub fn protocol(&mut self) -> crate::AResult<&'static dyn ChipProtocol> {
		if self.version == ChipVersion::Unknown {
			let info = self.detect()?;
			debug!("KnC {}-{}: detected {}", self.channel(), self.die, info.version);
			self.version = info.version;
		}
		self.version.protocol().ok_or_else(|| format_err!("chip version unresolved"))
	}
}

pub struct Command {
	pub name: &'static str,
	pub args: &'static str,
	pub description: &'static str,
	pub nargs: usize,
	/// Talks to the board controller; the SPI device must be open.
	pub needs_device: bool,
	handler: fn(&mut Context, &[&str]) -> crate::AResult<()>,
}

impl Command {
	pub fn run(&self, ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
		check_arity(self, args.len())?;
		(self.handler)(ctx, args)
	}
}

pub static COMMANDS: &[Command] = &[
	Command { name: "info", args: "", description: "ASIC version & info", nargs: 0, needs_device: true, handler: do_info },
	Command { name: "status", args: "", description: "ASIC status", nargs: 0, needs_device: true, handler: do_status },
	Command { name: "setwork", args: "core slot(1-15) clean(0/1) midstate data", description: "Set work vector", nargs: 5, needs_device: true, handler: do_setwork },
	Command { name: "report", args: "core", description: "Get nonce report", nargs: 1, needs_device: true, handler: do_report },
	Command { name: "halt", args: "core", description: "Halt core", nargs: 1, needs_device: true, handler: do_halt },
	Command { name: "freq", args: "frequency", description: "Set core frequency", nargs: 1, needs_device: true, handler: do_freq },
	Command { name: "led", args: "red green blue", description: "Set I/O board led", nargs: 3, needs_device: true, handler: do_led },
	Command { name: "raw", args: "response_length request_data", description: "Send raw ASIC request", nargs: 2, needs_device: true, handler: do_raw },
	Command { name: "eeprom", args: "port(0-5, -1 control board, -2 baseboard)", description: "Dump board EEPROM", nargs: 1, needs_device: false, handler: do_eeprom },
];

fn check_arity(cmd: &Command, given: usize) -> Result<(), AsicError> {
	if given != cmd.nargs {
		return Err(AsicError::ArityMismatch {
			command: cmd.name,
			expected: cmd.nargs,
			given,
		});
	}
	Ok(())
}

/// Look up `name` and check the argument count, before any hardware is
/// touched.
pub fn resolve(name: &str, nargs: usize) -> crate::AResult<&'static Command> {
	let cmd = COMMANDS.iter()
		.find(|c| c.name == name)
		.ok_or_else(|| AsicError::UnknownCommand(name.to_string()))?;
	check_arity(cmd, nargs)?;
	Ok(cmd)
}

pub fn dispatch(ctx: &mut Context, name: &str, args: &[&str]) -> crate::AResult<()> {
	resolve(name, args.len())?.run(ctx, args)
}

/// Command list for the usage text.
pub fn usage() -> String {
	let mut s = String::from("COMMANDS:\n");
	for cmd in COMMANDS {
		s.push_str(&format!("    {} {}\n\t{}\n", cmd.name, cmd.args, cmd.description));
	}
	s
}

/// Unsigned number with C-style base prefix: `0x` hex, leading `0` octal.
pub fn parse_number(s: &str) -> Option<u64> {
	if s.starts_with("0x") || s.starts_with("0X") {
		u64::from_str_radix(&s[2..], 16).ok()
	} else if s.len() > 1 && s.starts_with('0') {
		u64::from_str_radix(&s[1..], 8).ok()
	} else {
		s.parse::<u64>().ok()
	}
}

fn arg<T: TryFrom<u64>>(value: &str, name: &str) -> crate::AResult<T> {
	parse_number(value)
		.and_then(|v| T::try_from(v).ok())
		.ok_or_else(|| AsicError::Usage(format!("invalid {}: {:?}", name, value)).into())
}

fn signed_arg(value: &str, name: &str) -> crate::AResult<i32> {
	let (negative, digits) = if value.starts_with('-') {
		(true, &value[1..])
	} else {
		(false, value)
	};
	let v: i32 = arg(digits, name)?;
	Ok(if negative { -v } else { v })
}

fn hex_arg(dst: &mut [u8], value: &str, name: &str) -> usize {
	if let Err(e) = hex::check(value, dst.len()) {
		warn!("{}: {}", name, e);
	}
	hex::decode(dst, value)
}

fn do_info(ctx: &mut Context, _args: &[&str]) -> crate::AResult<()> {
	let info = ctx.detect()?;
	ctx.version = info.version;

	writeln!(ctx.out, "Version: {}", info.version.number())?;
	writeln!(ctx.out, "Cores: {}", info.cores)?;
	if let Some(pll) = info.pll {
		let wanting = info.want_work.iter().filter(|&&w| w).count();
		writeln!(ctx.out, "Want work: {}", wanting)?;
		writeln!(ctx.out, "PLL: {}{}",
			if pll.locked { "locked" } else { "unlocked" },
			if pll.bypass { " (bypass)" } else { "" },
		)?;
	}
	Ok(())
}

fn do_status(ctx: &mut Context, _args: &[&str]) -> crate::AResult<()> {
	let channel = ctx.channel();
	let status = board::read_status(ctx.link.transport(), channel)?;
	write!(ctx.out, "{}", status)?;
	Ok(())
}

fn do_setwork(ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
	let core: u16 = arg(args[0], "core")?;
	let slot: u8 = arg(args[1], "slot")?;
	let clean = match arg::<u8>(args[2], "clean")? {
		0 => false,
		1 => true,
		_ => return Err(AsicError::Usage(format!("invalid clean: {:?} (0 or 1)", args[2])).into()),
	};
	let address = ctx.core_address(core).with_slot(slot)
		.map_err(|e| AsicError::Usage(e.to_string()))?;

	let mut midstate = [0u8; asic::MIDSTATE_LEN];
	let mut data = [0u8; asic::DATA_LEN];
	hex_arg(&mut midstate, args[3], "midstate");
	hex_arg(&mut data[asic::DATA_TAIL_OFFSET..], args[4], "data");
	let work = WorkItem::new(midstate, data);

	let protocol = ctx.protocol()?;
	if let Some(report) = protocol.set_work(&mut ctx.link, &address, clean, &work)? {
		write!(ctx.out, "{}", report)?;
	}
	Ok(())
}

fn do_report(ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
	let core: u16 = arg(args[0], "core")?;
	let address = ctx.core_address(core);

	let protocol = ctx.protocol()?;
	let report = protocol.report(&mut ctx.link, &address)?;
	write!(ctx.out, "{}", report)?;
	Ok(())
}

fn do_halt(ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
	let core: u16 = arg(args[0], "core")?;
	let address = ctx.core_address(core);

	let protocol = ctx.protocol()?;
	protocol.halt(&mut ctx.link, &address)
}

fn do_freq(ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
	let freq = board::normalize_frequency(arg(args[0], "frequency")?);
	let (channel, die) = (ctx.channel(), ctx.die);

	let scan = board::set_frequency(ctx.link.transport(), channel, die, freq)?;
	if !scan.success {
		return Err(AsicError::FrequencyChange { channel, die }.into());
	}
	info!("KnC {}-{}: Frequency change successful", channel, die);
	Ok(())
}

fn do_led(ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
	let red: u8 = arg(args[0], "red")?;
	let green: u8 = arg(args[1], "green")?;
	let blue: u8 = arg(args[2], "blue")?;
	board::set_led(ctx.link.transport(), red, green, blue)
}

fn do_raw(ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
	let response_len: usize = arg(args[0], "response_length")?;
	if response_len > RAW_MAX_LEN {
		return Err(AsicError::Usage(format!("response_length {} too long (max {})", response_len, RAW_MAX_LEN)).into());
	}

	let mut buf = [0u8; RAW_MAX_LEN];
	let len = hex_arg(&mut buf, args[1], "request_data");
	// 0x-prefixed data was stored right-aligned
	let request = if args[1].starts_with("0x") || args[1].starts_with("0X") {
		&buf[RAW_MAX_LEN - len..]
	} else {
		&buf[..len]
	};

	let transfer = ctx.link.transfer(request, response_len)?;
	info!("KnC {}-{}: STATUS={}", ctx.channel(), ctx.die, transfer.status);
	writeln!(ctx.out, "Status  : {}", transfer.status)?;
	writeln!(ctx.out, "Response: {}", hex::encode(&transfer.response))?;
	Ok(())
}

fn do_eeprom(ctx: &mut Context, args: &[&str]) -> crate::AResult<()> {
	let index = signed_arg(args[0], "port")?;
	let selector = eeprom::Selector::from_index(index)
		.map_err(|e| AsicError::Usage(e.to_string()))?;

	let record = eeprom::read(&ctx.eeprom_root, selector)?;
	write!(ctx.out, "{}", record)?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::asic::frame;
	use crate::transport::{
		MockTransport,
		NoDevice,
		Reply,
	};

	const MIDSTATE: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
	const DATA: &str = "a0a1a2a3a4a5a6a7a8a9aaab";

	fn neptune_info() -> Vec<u8> {
		let mut resp = vec![0u8; frame::INFO_RESPONSE_LEN];
		resp[..4].copy_from_slice(&[0x00, 0x10, 0xa0, 0x02]);
		resp[4] = 0xff;
		resp
	}

	fn run(mock: &mut MockTransport, version: ChipVersion, name: &str, args: &[&str]) -> (crate::AResult<()>, String) {
		let mut out = Vec::new();
		let result = {
			let mut ctx = Context::new(mock, 1, 2, &mut out).with_version(version);
			dispatch(&mut ctx, name, args)
		};
		(result, String::from_utf8(out).unwrap())
	}

	fn typed(result: &crate::AResult<()>) -> &AsicError {
		result.as_ref().unwrap_err().downcast_ref::<AsicError>().expect("typed error")
	}

	#[test]
	fn numbers() {
		assert_eq!(parse_number("600"), Some(600));
		assert_eq!(parse_number("0x10"), Some(16));
		assert_eq!(parse_number("010"), Some(8));
		assert_eq!(parse_number("0"), Some(0));
		assert_eq!(parse_number("x"), None);
		assert_eq!(parse_number(""), None);
		assert_eq!(signed_arg("-2", "port").unwrap(), -2);
		assert!(arg::<u8>("256", "slot").is_err());
	}

	#[test]
	fn unknown_command() {
		let mut mock = MockTransport::new();
		let (result, _) = run(&mut mock, ChipVersion::Unknown, "frob", &[]);
		match typed(&result) {
			AsicError::UnknownCommand(name) => assert_eq!(name, "frob"),
			other => panic!("unexpected {:?}", other),
		}
		assert!(mock.sent().is_empty());
	}

	#[test]
	fn arity_checked_before_hardware() {
		let mut mock = MockTransport::new();
		let (result, _) = run(&mut mock, ChipVersion::Unknown, "setwork", &["1", "2", "0", MIDSTATE]);
		match typed(&result) {
			AsicError::ArityMismatch { command: "setwork", expected: 5, given: 4 } => (),
			other => panic!("unexpected {:?}", other),
		}
		assert!(typed(&result).is_fatal());
		assert!(mock.sent().is_empty());
	}

	#[test]
	fn info_detects() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::ok(&neptune_info()));
		let mut out = Vec::new();
		let version = {
			let mut ctx = Context::new(&mut mock, 1, 2, &mut out);
			dispatch(&mut ctx, "info", &[]).unwrap();
			ctx.version()
		};
		assert_eq!(version, ChipVersion::Neptune);
		let out = String::from_utf8(out).unwrap();
		assert!(out.starts_with("Version: 2\nCores: 16\nWant work: 8\n"), "{}", out);
		assert_eq!(mock.asic_requests(), vec![frame::info(2).to_vec()]);
	}

	#[test]
	fn missing_hardware_is_fatal() {
		let mut mock = MockTransport::new();
		let (result, _) = run(&mut mock, ChipVersion::Unknown, "report", &["3"]);
		match typed(&result) {
			AsicError::HardwareNotFound { channel: 1, die: 2 } => (),
			other => panic!("unexpected {:?}", other),
		}
		// only the detection request went out
		assert_eq!(mock.sent().len(), 1);
	}

	#[test]
	fn setwork_detects_once_then_sends_work() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::ok(&neptune_info()));
		let mut report = [0u8; 27];
		report[0] = 0x23;
		mock.push_reply(Reply::accepted(&report));

		let (result, out) = run(&mut mock, ChipVersion::Unknown, "setwork", &["5", "3", "1", MIDSTATE, DATA]);
		result.unwrap();
		assert!(out.starts_with("Next    : 0x3 LOADED\n"), "{}", out);

		let requests = mock.asic_requests();
		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0], frame::info(2).to_vec());
		let work = WorkItem::from_hex(MIDSTATE, DATA);
		assert_eq!(requests[1], frame::neptune_setwork(2, 5, 3, Some(&work), true).to_vec());
	}

	#[test]
	fn setwork_rejects_bad_slot() {
		let mut mock = MockTransport::new();
		let (result, _) = run(&mut mock, ChipVersion::Neptune, "setwork", &["5", "16", "0", MIDSTATE, DATA]);
		match typed(&result) {
			AsicError::Usage(_) => (),
			other => panic!("unexpected {:?}", other),
		}
		assert!(mock.sent().is_empty());
	}

	#[test]
	fn busy_is_reported_not_fatal() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::ok(&[0u8; 27]));
		let (result, out) = run(&mut mock, ChipVersion::Neptune, "setwork", &["5", "3", "0", MIDSTATE, DATA]);
		assert!(!typed(&result).is_fatal());
		assert!(out.is_empty());
	}

	#[test]
	fn jupiter_report() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::ok(&[0x20, 0xab, 0x30, 0x00, 0x00, 0x00, 0x01]));
		let (result, out) = run(&mut mock, ChipVersion::Jupiter, "report", &["0x10"]);
		result.unwrap();
		assert_eq!(out, "Next    : LOADED\nCurrent : 0x3\nProgress: 0xabxxxxxx\nNonce 0 : 0x0 00000001\n");
		assert_eq!(mock.asic_requests(), vec![frame::report(2, 0x10).to_vec()]);
	}

	#[test]
	fn jupiter_halt_is_double() {
		let mut mock = MockTransport::new();
		for _ in 0..3 {
			mock.push_reply(Reply::ok(&[]));
		}
		let (result, _) = run(&mut mock, ChipVersion::Jupiter, "halt", &["7"]);
		result.unwrap();
		let halt = frame::jupiter_halt(2, 7).to_vec();
		let requests = mock.asic_requests();
		assert_eq!(requests.iter().filter(|r| **r == halt).count(), 2);
		assert_eq!(requests[requests.len() - 2..], [halt.clone(), halt][..]);
	}

	#[test]
	fn neptune_halt_failure_keeps_exit_code() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::Asic { response: vec![], ack: crate::transfer::ACK });
		let (result, _) = run(&mut mock, ChipVersion::Neptune, "halt", &["7"]);
		match typed(&result) {
			AsicError::TransferError { channel: 1, die: 2, .. } => (),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(crate::error::exit_code(&result.unwrap_err()), 0);
		assert_eq!(mock.asic_requests(), vec![frame::neptune_halt(2, 7).to_vec()]);
	}

	#[test]
	fn freq_in_hz() {
		let mut resp = vec![0u8; board::FREQ_FRAME_LEN];
		resp[7..11].copy_from_slice(&[0xf0, 0x02, 0x58, 0xf1]);
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::Raw(resp));
		let (result, _) = run(&mut mock, ChipVersion::Unknown, "freq", &["600000000"]);
		result.unwrap();
		assert_eq!(mock.sent().len(), 1);
		assert_eq!(mock.sent()[0][..5], board::freq_frame(1, 2, 600)[..5]);
	}

	#[test]
	fn freq_failure() {
		let mut mock = MockTransport::new();
		let (result, _) = run(&mut mock, ChipVersion::Unknown, "freq", &["600"]);
		match typed(&result) {
			AsicError::FrequencyChange { channel: 1, die: 2 } => (),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(mock.sent()[0][3..5], [0x02, 0x58]);
	}

	#[test]
	fn led_range() {
		let mut mock = MockTransport::new();
		let (result, _) = run(&mut mock, ChipVersion::Unknown, "led", &["1", "2", "3"]);
		result.unwrap();
		assert_eq!(mock.sent(), &[vec![0x11, 0x23]][..]);

		let (result, _) = run(&mut mock, ChipVersion::Unknown, "led", &["16", "0", "0"]);
		match typed(&result) {
			AsicError::Usage(_) => (),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(mock.sent().len(), 1);
	}

	#[test]
	fn raw_sends_request_verbatim() {
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::ok(&[0xca, 0xfe]));
		let (result, out) = run(&mut mock, ChipVersion::Unknown, "raw", &["2", "82020001"]);
		result.unwrap();
		assert_eq!(out, "Status  : 0\nResponse: cafe\n");
		assert_eq!(mock.asic_requests(), vec![vec![0x82, 0x02, 0x00, 0x01]]);
	}

	#[test]
	fn raw_reverse_sends_tail() {
		let mut mock = MockTransport::new();
		let (result, _) = run(&mut mock, ChipVersion::Unknown, "raw", &["0", "0x010082"]);
		result.unwrap();
		assert_eq!(mock.asic_requests(), vec![vec![0x82, 0x00, 0x01]]);
	}

	#[test]
	fn status_prints_board() {
		let mut resp = vec![0u8; board::STATUS_FRAME_LEN];
		resp[6] = 0x02;
		let mut mock = MockTransport::new();
		mock.push_reply(Reply::Raw(resp));
		let (result, out) = run(&mut mock, ChipVersion::Unknown, "status", &[]);
		result.unwrap();
		assert!(out.contains("Board   : type 0x02"), "{}", out);
		assert_eq!(mock.sent()[0][0], board::status_frame(1)[0]);
	}

	#[test]
	fn eeprom_dump() {
		let dir = tempfile::tempdir().unwrap();
		let dev = dir.path().join("2-0054");
		std::fs::create_dir(&dev).unwrap();
		std::fs::write(dev.join("eeprom"), vec![0x5a; eeprom::RECORD_LEN]).unwrap();

		let mut device = NoDevice;
		let mut out = Vec::new();
		{
			let mut ctx = Context::new(&mut device, 0, 0, &mut out).with_eeprom_root(dir.path().to_path_buf());
			dispatch(&mut ctx, "eeprom", &["-1"]).unwrap();
		}
		let out = String::from_utf8(out).unwrap();
		assert!(out.starts_with("00000000  5a 5a"), "{}", out);
	}

	#[test]
	fn only_eeprom_runs_without_device() {
		for cmd in COMMANDS {
			assert_eq!(cmd.needs_device, cmd.name != "eeprom", "{}", cmd.name);
		}

		let mut device = NoDevice;
		let mut out = Vec::new();
		let mut ctx = Context::new(&mut device, 0, 0, &mut out);
		assert!(dispatch(&mut ctx, "led", &["1", "2", "3"]).is_err());
	}

	#[test]
	fn usage_lists_every_command() {
		let text = usage();
		for cmd in COMMANDS {
			assert!(text.contains(cmd.name));
		}
	}
}
