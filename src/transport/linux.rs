//! Transport over the Linux i2c-dev interface (`/dev/i2c-N`)

use std::fs;
use std::io::{
	self,
	Read,
	Write,
};
use std::os::unix::io::AsRawFd;
use std::path::{
	Path,
	PathBuf,
};
use std::thread;
use std::time::{
	Duration,
	Instant,
};

use libc::{
	EAGAIN,
	EBUSY,
	ENXIO,
	EREMOTEIO,
	c_ulong,
	ioctl,
};

use super::{
	Completion,
	DeviceAddress,
	Transport,
	TransportError,
};

// from <linux/i2c-dev.h> and <linux/i2c.h>
const I2C_SLAVE: c_ulong = 0x0703;
const I2C_RDWR: c_ulong = 0x0707;
const I2C_M_RD: u16 = 0x0001;
// i2c-dev rejects longer I2C_RDWR messages and truncates longer read()s
const I2C_MAX_TRANSFER: usize = 8192;

#[repr(C)]
struct I2cMsg {
	addr: u16,
	flags: u16,
	len: u16,
	buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
	msgs: *mut I2cMsg,
	nmsgs: u32,
}

// first part goes with the address phase, the rest continues at the chip's
// internal address counter
fn split_transfer(target: &mut [u8]) -> (&mut [u8], ::std::slice::ChunksMut<u8>) {
	let first = if target.len() < I2C_MAX_TRANSFER { target.len() } else { I2C_MAX_TRANSFER };
	let (first, rest) = target.split_at_mut(first);
	(first, rest.chunks_mut(I2C_MAX_TRANSFER))
}

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

#[derive(Debug)]
pub struct I2cDev {
	path: PathBuf,
	file: fs::File,
	device: DeviceAddress,
	write_delay: Duration,
	// address phase waiting for the read that completes the repeated START
	pending_address: Option<Vec<u8>>,
}

impl I2cDev {
	// TODO: flock the bus device while a memory is open
	pub fn open<P: AsRef<Path>>(path: P, device: DeviceAddress) -> io::Result<Self> {
		let path = path.as_ref().to_path_buf();
		let file = fs::OpenOptions::new().read(true).write(true).open(&path)?;
		Ok(I2cDev {
			path,
			file,
			device,
			write_delay: Duration::from_millis(0),
			pending_address: None,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn device(&self) -> DeviceAddress {
		self.device
	}

	/// Time to wait after every write transaction; EEPROMs don't answer
	/// while their internal write cycle runs (AT24Cxx: up to 10ms).
	pub fn set_write_delay(&mut self, delay: Duration) {
		self.write_delay = delay;
	}

	pub fn write_delay(&self) -> Duration {
		self.write_delay
	}

	fn bus_error(&self, e: io::Error) -> failure::Error {
		match e.raw_os_error() {
			Some(ENXIO) | Some(EREMOTEIO) => TransportError::NoAcknowledge(self.device).into(),
			Some(EBUSY) | Some(EAGAIN) => TransportError::BusBusy(self.device).into(),
			_ => {
				let msg = format!("i2c transfer on {} to device {} failed", self.path.display(), self.device);
				failure::Error::from(e).context(msg).into()
			},
		}
	}

	fn send(&mut self, buf: &[u8]) -> crate::AResult<()> {
		let written = match self.file.write(buf) {
			Ok(n) => n,
			Err(e) => return Err(self.bus_error(e)),
		};
		ensure!(written == buf.len(), "short i2c write to device {}: {} of {} bytes", self.device, written, buf.len());
		if self.write_delay > Duration::from_millis(0) {
			reliable_sleep(self.write_delay);
		}
		Ok(())
	}

	fn write_then_read(&mut self, mut address: Vec<u8>, target: &mut [u8]) -> crate::AResult<()> {
		ensure!(target.len() <= I2C_MAX_TRANSFER, "i2c read of {} bytes too long", target.len());
		let mut msgs = [
			I2cMsg {
				addr: self.device.0 as u16,
				flags: 0,
				len: address.len() as u16,
				buf: address.as_mut_ptr(),
			},
			I2cMsg {
				addr: self.device.0 as u16,
				flags: I2C_M_RD,
				len: target.len() as u16,
				buf: target.as_mut_ptr(),
			},
		];
		let mut data = I2cRdwrIoctlData {
			msgs: msgs.as_mut_ptr(),
			nmsgs: msgs.len() as u32,
		};
		let res = unsafe { ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &mut data as *mut I2cRdwrIoctlData) };
		if res < 0 {
			return Err(self.bus_error(io::Error::last_os_error()));
		}
		Ok(())
	}

	fn read_plain(&mut self, target: &mut [u8]) -> crate::AResult<()> {
		let read = match self.file.read(target) {
			Ok(n) => n,
			Err(e) => return Err(self.bus_error(e)),
		};
		ensure!(read == target.len(), "short i2c read from device {}: {} of {} bytes", self.device, read, target.len());
		Ok(())
	}
}

impl Transport for I2cDev {
	fn initialize(&mut self) -> crate::AResult<()> {
		debug!("{}: selecting device {}", self.path.display(), self.device);
		let res = unsafe { ioctl(self.file.as_raw_fd(), I2C_SLAVE as _, self.device.0 as c_ulong) };
		if res < 0 {
			let msg = format!("couldn't select device {} on {}", self.device, self.path.display());
			return Err(failure::Error::from(io::Error::last_os_error()).context(msg).into());
		}
		self.pending_address = None;
		Ok(())
	}

	fn write_prefixed(&mut self, prefix: &[u8], data: &[u8]) -> crate::AResult<()> {
		if self.pending_address.take().is_some() {
			warn!("{}: dropping address phase without a read", self.path.display());
		}
		let mut buf = Vec::with_capacity(prefix.len() + data.len());
		buf.extend_from_slice(prefix);
		buf.extend_from_slice(data);
		self.send(&buf)
	}

	fn write_address(&mut self, address: &[u8], completion: Completion) -> crate::AResult<()> {
		match completion {
			Completion::Stop => {
				self.pending_address = None;
				self.send(address)
			},
			// i2c-dev can't keep the bus between syscalls; send both phases
			// in one I2C_RDWR transfer with the next read
			Completion::RepeatedStart => {
				self.pending_address = Some(address.to_vec());
				Ok(())
			},
		}
	}

	fn read(&mut self, target: &mut [u8]) -> crate::AResult<()> {
		let (first, rest) = split_transfer(target);
		match self.pending_address.take() {
			Some(address) => self.write_then_read(address, first)?,
			None => self.read_plain(first)?,
		}
		for part in rest {
			self.read_plain(part)?;
		}
		Ok(())
	}
}
