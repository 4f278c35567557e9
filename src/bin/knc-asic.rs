#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate knc_asic;
use knc_asic::*;

use std::io;
use std::process::exit;

use knc_asic::asic::ChipVersion;
use knc_asic::commands::Context;
use knc_asic::config::Config;
use knc_asic::transport::{
	NoDevice,
	SpiTransport,
	Transport,
};

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn main_app() -> AResult<()> {
	let commands_help = commands::usage();
	let matches = clap_app!(@app (app_from_crate!())
		(setting: clap::AppSettings::AllowNegativeNumbers)
		(setting: clap::AppSettings::TrailingVarArg)
		(after_help: commands_help.as_str())
		(@arg jupiter: -j conflicts_with[neptune] "Force Jupiter (generation 1) protocol")
		(@arg neptune: -n conflicts_with[jupiter] "Force Neptune (generation 2) protocol")
		(@arg device: -d --device +takes_value env(config::ENV_SPI_DEVICE) "spidev device node")
		(@arg speed: -s --speed +takes_value env(config::ENV_SPI_SPEED) "SPI clock in Hz")
		(@arg CHANNEL: +required "Controller channel")
		(@arg DIE: +required "Die on the channel")
		(@arg COMMAND: +required "Command to run")
		(@arg ARGS: ... "Command arguments")
	).get_matches();

	let mut config = Config::default();
	if let Some(device) = matches.value_of_os("device") {
		config.spi.device = device.into();
	}
	if matches.is_present("speed") {
		config.spi.speed_hz = get_param(&matches, "speed")?;
	}
	if matches.is_present("jupiter") {
		config.chip_version = ChipVersion::Jupiter;
	} else if matches.is_present("neptune") {
		config.chip_version = ChipVersion::Neptune;
	}

	let channel: u8 = get_param(&matches, "CHANNEL")?;
	let die: u8 = get_param(&matches, "DIE")?;
	let name = matches.value_of("COMMAND").unwrap_or_default();
	let args: Vec<&str> = matches.values_of("ARGS").map(|v| v.collect()).unwrap_or_default();

	// usage errors must not need the hardware
	let command = commands::resolve(name, args.len())?;

	let mut device: Box<dyn Transport> = if command.needs_device {
		Box::new(SpiTransport::open(&config.spi)?)
	} else {
		Box::new(NoDevice)
	};
	let stdout = io::stdout();
	let mut out = stdout.lock();
	let mut ctx = Context::new(&mut *device, channel, die, &mut out)
		.with_version(config.chip_version)
		.with_eeprom_root(config.eeprom_root);
	command.run(&mut ctx, &args)
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	// main_app has released the device by the time an error arrives here
	if let Err(e) = main_app() {
		error!("{}", e);
		let code = error::exit_code(&e);
		if code != 0 {
			exit(code);
		}
	}
}
