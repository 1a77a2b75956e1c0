//! In-memory two-wire memory chip
//!
//! Behaves like a typical serial EEPROM:
//! - a write wraps around inside the page of its start address (the chip
//!   only latches the low address bits while buffering a page)
//! - reads auto-increment across pages and wrap at the end of the array
//! - a plain read continues after the last accessed byte
//!
//! Every transport call is recorded, and calls can be made to fail.

use super::{
	Completion,
	DeviceAddress,
	Transport,
	TransportError,
};

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Call {
	Initialize,
	WritePrefixed {
		prefix: Vec<u8>,
		data: Vec<u8>,
	},
	WriteAddress {
		address: Vec<u8>,
		completion: Completion,
	},
	Read {
		len: usize,
	},
}

#[derive(Clone, Debug)]
pub struct SimulatedChip {
	device: DeviceAddress,
	cells: Vec<u8>,
	page_size: usize,
	counter: usize,
	calls: Vec<Call>,
	fail_at: Option<usize>,
}

impl SimulatedChip {
	/// Erased chip (all bytes `0xff`) with `size` bytes and the given page size
	pub fn new(size: usize, page_size: usize) -> Self {
		assert!(size > 0);
		assert!(page_size > 0);
		SimulatedChip {
			device: DeviceAddress(0x50),
			cells: vec![0xff; size],
			page_size,
			counter: 0,
			calls: Vec::new(),
			fail_at: None,
		}
	}

	pub fn cells(&self) -> &[u8] {
		&self.cells
	}

	pub fn cells_mut(&mut self) -> &mut [u8] {
		&mut self.cells
	}

	pub fn calls(&self) -> &[Call] {
		&self.calls
	}

	pub fn clear_calls(&mut self) {
		self.calls.clear();
	}

	/// Chunk sizes of all recorded `write_prefixed` calls
	pub fn write_lengths(&self) -> Vec<usize> {
		self.calls.iter().filter_map(|call| match call {
			Call::WritePrefixed { data, .. } => Some(data.len()),
			_ => None,
		}).collect()
	}

	/// Let the `call`-th transport call (counting from 1, `initialize`
	/// included) fail with a missing acknowledge.
	pub fn fail_at_call(&mut self, call: usize) {
		self.fail_at = Some(call);
	}

	fn record(&mut self, call: Call) -> crate::AResult<()> {
		self.calls.push(call);
		if Some(self.calls.len()) == self.fail_at {
			return Err(TransportError::NoAcknowledge(self.device).into());
		}
		Ok(())
	}

	fn decode_address(&self, address: &[u8]) -> crate::AResult<usize> {
		ensure!(!address.is_empty() && address.len() <= 2, "unsupported address length {}", address.len());
		let address = address.iter().fold(0usize, |acc, b| (acc << 8) | (*b as usize));
		Ok(address % self.cells.len())
	}
}

impl Transport for SimulatedChip {
	fn initialize(&mut self) -> crate::AResult<()> {
		self.record(Call::Initialize)
	}

	fn write_prefixed(&mut self, prefix: &[u8], data: &[u8]) -> crate::AResult<()> {
		self.record(Call::WritePrefixed {
			prefix: prefix.to_vec(),
			data: data.to_vec(),
		})?;
		let start = self.decode_address(prefix)?;
		let page_start = start - start % self.page_size;
		let mut offset = start % self.page_size;
		for b in data {
			let cell = (page_start + offset) % self.cells.len();
			self.cells[cell] = *b;
			self.counter = (cell + 1) % self.cells.len();
			offset = (offset + 1) % self.page_size;
		}
		Ok(())
	}

	fn write_address(&mut self, address: &[u8], completion: Completion) -> crate::AResult<()> {
		self.record(Call::WriteAddress {
			address: address.to_vec(),
			completion,
		})?;
		self.counter = self.decode_address(address)?;
		Ok(())
	}

	fn read(&mut self, target: &mut [u8]) -> crate::AResult<()> {
		self.record(Call::Read { len: target.len() })?;
		for t in target.iter_mut() {
			*t = self.cells[self.counter];
			self.counter = (self.counter + 1) % self.cells.len();
		}
		Ok(())
	}
}
