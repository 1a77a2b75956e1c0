//! Byte transport for a two-wire (I²C) memory chip.
//!
//! The memory layer only needs a few primitives from the bus driver:
//! - a combined "address, then data" write in one transaction
//! - an address-only write, either finished with a STOP or holding the bus
//!   (repeated START) for a following read
//! - a plain read, which continues at the chip's internal address counter
//!
//! Device addressing, clocking and retries are the transport's business.

use std::fmt;
use std::str;

// i2c-dev backend; no other OS yet
pub mod linux;
pub mod simulated;

/// How an address-only write ends
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Completion {
	/// release the bus (STOP condition)
	Stop,
	/// keep the bus for the following read (repeated START)
	RepeatedStart,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum TransportError {
	#[fail(display = "device {} did not acknowledge", _0)]
	NoAcknowledge(DeviceAddress),
	#[fail(display = "bus busy while talking to device {}", _0)]
	BusBusy(DeviceAddress),
}

pub trait Transport {
	fn initialize(&mut self) -> crate::AResult<()>;

	// one transaction: address phase, data phase, STOP
	fn write_prefixed(&mut self, prefix: &[u8], data: &[u8]) -> crate::AResult<()>;

	fn write_address(&mut self, address: &[u8], completion: Completion) -> crate::AResult<()>;

	fn read(&mut self, target: &mut [u8]) -> crate::AResult<()>;
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn initialize(&mut self) -> crate::AResult<()> {
		T::initialize(*self)
	}
	fn write_prefixed(&mut self, prefix: &[u8], data: &[u8]) -> crate::AResult<()> {
		T::write_prefixed(*self, prefix, data)
	}
	fn write_address(&mut self, address: &[u8], completion: Completion) -> crate::AResult<()> {
		T::write_address(*self, address, completion)
	}
	fn read(&mut self, target: &mut [u8]) -> crate::AResult<()> {
		T::read(*self, target)
	}
}

/// 7-bit device address on the bus
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAddress(pub u8);

impl DeviceAddress {
	pub const MAX: u8 = 0x7f;
}

impl fmt::Debug for DeviceAddress {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "DeviceAddress(0x{:02x})", self.0)
	}
}

impl fmt::Display for DeviceAddress {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl str::FromStr for DeviceAddress {
	type Err = ::failure::Error;

	// always hex: "50", "0x50", "0X50"
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let digits = if s.starts_with("0x") || s.starts_with("0X") { &s[2..] } else { s };
		ensure!(!digits.is_empty() && digits.len() <= 2, "invalid device address: {:?}", s);

		let address = with_context!(("invalid device address: {}", s),
			Ok(u8::from_str_radix(digits, 16)?)
		)?;
		ensure!(address <= Self::MAX, "invalid device address: {} (only 7-bit addresses allowed)", s);

		Ok(DeviceAddress(address))
	}
}

#[cfg(test)]
mod test {
	use super::DeviceAddress;

	fn check_address(address: u8, repr: &str) {
		match repr.parse::<DeviceAddress>() {
			Err(e) => panic!("{} failed to parse as DeviceAddress: {}", repr, e),
			Ok(a) => assert_eq!(DeviceAddress(address), a, "failed validating parsed {}", repr),
		}
	}

	fn check_address_canonical(address: u8, repr: &str) {
		check_address(address, repr);
		assert_eq!(DeviceAddress(address).to_string(), repr, "failed stringifying device address {}", address);
	}

	fn check_invalid_address(repr: &str) {
		assert!(repr.parse::<DeviceAddress>().is_err(), "{:?} must not be a valid device address", repr);
	}

	#[test]
	fn parse_device_address() {
		check_address(0x50, "50");
		check_address(0x50, "0X50");
		check_address(0x08, "8");
		check_address_canonical(0x00, "0x00");
		check_address_canonical(0x50, "0x50");
		check_address_canonical(0x68, "0x68");
		check_address_canonical(0x7f, "0x7f");
		check_invalid_address("");
		check_invalid_address("0x");
		check_invalid_address("0x80");
		check_invalid_address("ff");
		check_invalid_address("0x050");
		check_invalid_address("g0");
		check_invalid_address("-1");
	}
}
