#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate twowire_memory;
use twowire_memory::*;

use std::io::{
	self,
	Write,
};
use std::process::exit;
use std::time::Duration;

use twowire_memory::transport::linux::I2cDev;

type I2cMemory = Memory<I2cDev>;

// AT24Cxx write cycle; the chip doesn't acknowledge the next page before
const DEFAULT_WRITE_DELAY_MS: u64 = 10;

// decimal, or hex with "0x" prefix
fn parse_number(s: &str) -> AResult<u64> {
	let value = if s.starts_with("0x") || s.starts_with("0X") {
		u64::from_str_radix(&s[2..], 16)?
	} else {
		s.parse::<u64>()?
	};
	Ok(value)
}

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

fn get_number(matches: &clap::ArgMatches, name: &str, max: u64) -> AResult<u64> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	let value = param_context(name, parse_number(param))?;
	ensure!(value <= max, "invalid parameter {}: {} (maximum {})", name, value, max);
	Ok(value)
}

fn param_context<T>(name: &str, r: AResult<T>) -> AResult<T> {
	r.map_err(|e| {
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn parse_hex_bytes(s: &str) -> AResult<Vec<u8>> {
	let s = if s.starts_with("0x") || s.starts_with("0X") { &s[2..] } else { s };
	ensure!(!s.is_empty() && 0 == s.len() % 2, "hex data needs an even, non-zero number of digits: {:?}", s);
	let mut data = Vec::with_capacity(s.len() / 2);
	for i in (0..s.len()).step_by(2) {
		let digits = s.get(i..i + 2).ok_or_else(|| format_err!("invalid hex data: {:?}", s))?;
		data.push(u8::from_str_radix(digits, 16)?);
	}
	Ok(data)
}

fn hexdump(start: usize, data: &[u8]) {
	for (i, b) in data.iter().enumerate() {
		if 0 == i % 16 {
			print!("{:08x} ", start + i);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", b);
		if 15 == i % 16 {
			println!();
		}
	}
	if 0 != data.len() % 16 {
		println!();
	}
	println!("{:08x}", start + data.len());
}

fn open(matches: &clap::ArgMatches) -> AResult<I2cMemory> {
	let bus = matches.value_of("bus").unwrap_or("/dev/i2c-1");
	let device: DeviceAddress = match matches.value_of("address") {
		Some(_) => get_param(matches, "address")?,
		None => DeviceAddress(0x50),
	};
	let max_position = get_number(matches, "max", 0xffff)? as u16;
	let page_size = get_number(matches, "page", 0xffff)? as u16;
	let min_position = match matches.value_of("min") {
		Some(_) => get_number(matches, "min", 0xffff)? as u16,
		None => 0,
	};
	let write_delay = write_delay(matches)?;
	let address_width = if matches.is_present("narrow") {
		AddressWidth::One
	} else {
		AddressWidth::Two
	};

	let mut transport = with_context_io(bus, I2cDev::open(bus, device))?;
	transport.set_write_delay(write_delay);

	let config = MemoryConfiguration::new(max_position, page_size, min_position)
		.with_address_width(address_width);
	open_memory(transport, config)
}

fn write_delay(matches: &clap::ArgMatches) -> AResult<Duration> {
	let millis = match matches.value_of("delay") {
		Some(_) => get_number(matches, "delay", 1000)?,
		None => DEFAULT_WRITE_DELAY_MS,
	};
	Ok(Duration::from_millis(millis))
}

fn with_context_io<T>(bus: &str, r: io::Result<T>) -> AResult<T> {
	r.map_err(|e| {
		let msg = format!("couldn't open {}: {}", bus, e);
		failure::Error::from(e).context(msg).into()
	})
}

fn info(memory: &I2cMemory) -> AResult<()> {
	let transport = memory.transport();
	println!("Bus: {}", transport.path().display());
	println!("Device: {}", transport.device());
	println!("Write delay: {} ms", transport.write_delay().as_millis());
	println!("Configuration: {}", memory.configuration());
	println!("Capacity: {} bytes, {} bits, {} KiB, {} Kibit",
		memory.capacity_bytes(),
		memory.capacity_bits(),
		memory.capacity_kibytes(),
		memory.capacity_kibits(),
	);
	println!("Pages: {} of {} bytes", memory.pages(), memory.page_size());
	println!("Logical 0 is physical 0x{:04x}", memory.physical_position(0));
	Ok(())
}

fn dump(memory: &mut I2cMemory, sub_m: &clap::ArgMatches) -> AResult<()> {
	let mut data = vec![0u8; memory.capacity_bytes() as usize];
	memory.retrieve_stream(0, &mut data)?;
	if sub_m.is_present("raw") {
		io::stdout().write_all(&data)?;
	} else {
		hexdump(0, &data);
	}
	Ok(())
}

fn read(memory: &mut I2cMemory, sub_m: &clap::ArgMatches) -> AResult<()> {
	let position = get_number(sub_m, "POSITION", 0xffff)? as usize;
	let length = get_number(sub_m, "LENGTH", 0x1_0000)? as usize;
	let mut data = vec![0u8; length];
	memory.retrieve_stream(position, &mut data)?;
	hexdump(position, &data);
	Ok(())
}

fn write(memory: &mut I2cMemory, sub_m: &clap::ArgMatches) -> AResult<()> {
	let position = get_number(sub_m, "POSITION", 0xffff)? as usize;
	let data = param_context("DATA", parse_hex_bytes(sub_m.value_of("DATA").unwrap_or("")))?;
	memory.store_stream(position, &data)?;
	info!("Stored {} byte(s) at position {}", data.len(), position);
	Ok(())
}

fn fill(memory: &mut I2cMemory, sub_m: &clap::ArgMatches) -> AResult<()> {
	let position = get_number(sub_m, "POSITION", 0xffff)? as usize;
	let length = get_number(sub_m, "LENGTH", 0x1_0000)? as usize;
	let value = get_number(sub_m, "VALUE", 0xff)? as u8;
	memory.fill(position, length, value)?;
	info!("Filled from position {} with 0x{:02x}", position, value);
	Ok(())
}

fn demo(memory: &mut I2cMemory) -> AResult<()> {
	let value_byte: u8 = 0xa5;
	memory.store(0, &value_byte)?;
	println!("Stored byte: 0x{:02x}", value_byte);
	println!("Retrieved byte: 0x{:02x}", memory.retrieve::<u8>(0)?);

	let value_int: i32 = 0xaa55;
	memory.store(0, &value_int)?;
	println!("Stored integer: 0x{:x}", value_int);
	println!("Retrieved integer: 0x{:x}", memory.retrieve::<i32>(0)?);

	let value_float: f32 = 123.45;
	memory.store(0, &value_float)?;
	println!("Stored float: {}", value_float);
	println!("Retrieved float: {}", memory.retrieve::<f32>(0)?);

	Ok(())
}

fn app() -> clap::App<'static, 'static> {
	clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg bus: -b --bus +takes_value "i2c-dev bus device (default: /dev/i2c-1)")
		(@arg address: -a --address +takes_value "7-bit device address in hex (default: 50)")
		(@arg max: -m --max +takes_value +required "highest physical memory position")
		(@arg page: -p --page +takes_value +required "page size in bytes")
		(@arg min: --min +takes_value "physical position of logical position 0 (default: 0)")
		(@arg narrow: -n --narrow "send positions as one byte instead of two")
		(@arg delay: -d --delay +takes_value "delay after each write in ms; 0 only for RAM chips (default: 10)")
		(@subcommand info =>
			(about: "show memory geometry")
		)
		(@subcommand dump =>
			(about: "dump whole memory")
			(@arg raw: -r --raw "write binary data to stdout")
		)
		(@subcommand read =>
			(about: "read bytes")
			(@arg POSITION: +required "logical position")
			(@arg LENGTH: +required "number of bytes")
		)
		(@subcommand write =>
			(about: "write bytes")
			(@arg POSITION: +required "logical position")
			(@arg DATA: +required "data as hex digits")
		)
		(@subcommand fill =>
			(about: "fill positions with a value")
			(@arg POSITION: +required "logical position")
			(@arg LENGTH: +required "number of bytes")
			(@arg VALUE: +required "byte value")
		)
		(@subcommand erase =>
			(about: "set all full pages to 0xff")
		)
		(@subcommand current =>
			(about: "read the byte after the last accessed position")
		)
		(@subcommand demo =>
			(about: "store and retrieve a byte, an integer and a float at position 0")
		)
	)
}

fn main_app() -> AResult<()> {
	let matches = app().get_matches();

	let mut memory = open(&matches)?;

	match matches.subcommand() {
		("info", _) => {
			info(&memory)
		}
		("dump", Some(sub_m)) => {
			dump(&mut memory, sub_m)
		}
		("read", Some(sub_m)) => {
			read(&mut memory, sub_m)
		}
		("write", Some(sub_m)) => {
			write(&mut memory, sub_m)
		}
		("fill", Some(sub_m)) => {
			fill(&mut memory, sub_m)
		}
		("erase", _) => {
			memory.erase()?;
			info!("Erased {} pages", memory.pages());
			Ok(())
		}
		("current", _) => {
			println!("0x{:02x}", memory.retrieve_current()?);
			Ok(())
		}
		("demo", _) => {
			demo(&mut memory)
		}
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
