//! Flat, zero-based byte access to a memory chip behind a [`Transport`].
//!
//! Positions passed to [`Memory`] are logical: logical position 0 is the
//! configured minimal physical position. Stores are split at page
//! boundaries of the logical position, retrieves use one sequential read.
//!
//! Failing operations don't roll back: a store or erase interrupted by a
//! transport error may leave some pages written.

use std::cmp;

use bytemuck::Pod;

use crate::transport::{
	Completion,
	Transport,
};

mod config;
mod position;

pub use self::config::{
	AddressPrefix,
	AddressWidth,
	MemoryConfiguration,
};

pub use self::position::{
	Chunk,
	PageChunks,
	PositionError,
	page_chunks,
};

const ERASED: u8 = 0xff;

#[derive(Debug)]
pub struct Memory<T: Transport> {
	transport: T,
	config: MemoryConfiguration,
}

/// Initialize the transport and wrap it with the given geometry
pub fn open_memory<T: Transport>(mut transport: T, config: MemoryConfiguration) -> crate::AResult<Memory<T>> {
	debug!("opening memory: {}", config);
	transport.initialize()?;
	Ok(Memory {
		transport,
		config,
	})
}

impl<T: Transport> Memory<T> {
	pub fn configuration(&self) -> &MemoryConfiguration {
		&self.config
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn into_transport(self) -> T {
		self.transport
	}

	pub fn capacity_bytes(&self) -> u32 {
		self.config.capacity_bytes()
	}

	pub fn capacity_bits(&self) -> u32 {
		self.config.capacity_bits()
	}

	pub fn capacity_kibytes(&self) -> u32 {
		self.config.capacity_kibytes()
	}

	pub fn capacity_kibits(&self) -> u32 {
		self.config.capacity_kibits()
	}

	pub fn min_position(&self) -> u16 {
		self.config.min_position()
	}

	pub fn max_position(&self) -> u16 {
		self.config.max_position()
	}

	pub fn page_size(&self) -> u16 {
		self.config.page_size()
	}

	pub fn pages(&self) -> u32 {
		self.config.pages()
	}

	pub fn physical_position(&self, logical_position: usize) -> usize {
		self.config.physical_position(logical_position)
	}

	pub fn address_width(&self) -> AddressWidth {
		self.config.address_width()
	}

	pub fn is_position_in_bytes(&self) -> bool {
		self.config.address_width() == AddressWidth::One
	}

	pub fn is_position_in_words(&self) -> bool {
		self.config.address_width() == AddressWidth::Two
	}

	pub fn set_address_width(&mut self, address_width: AddressWidth) {
		self.config.set_address_width(address_width);
	}

	pub fn set_position_in_bytes(&mut self) {
		self.set_address_width(AddressWidth::One);
	}

	pub fn set_position_in_words(&mut self) {
		self.set_address_width(AddressWidth::Two);
	}

	pub fn validate_range(&self, position: usize, length: usize) -> crate::AResult<()> {
		Ok(self.config.validate_range(position, length)?)
	}

	fn prefix(&self, position: usize) -> AddressPrefix {
		self.config.address_width().encode(self.physical_position(position))
	}

	// `data` must not cross a page boundary
	fn write_chunk(&mut self, position: usize, data: &[u8]) -> crate::AResult<()> {
		let prefix = self.prefix(position);
		trace!("writing {} byte(s) at 0x{:04x}", data.len(), self.physical_position(position));
		self.transport.write_prefixed(prefix.as_bytes(), data)
	}

	/// Store `data` starting at logical `position`, one transaction per page
	pub fn store_stream(&mut self, position: usize, data: &[u8]) -> crate::AResult<()> {
		self.validate_range(position, data.len())?;
		for chunk in page_chunks(position, data.len(), self.page_size() as usize) {
			self.write_chunk(chunk.position, &data[chunk.offset..][..chunk.len])?;
		}
		Ok(())
	}

	/// Fill `target` starting at logical `position` in one sequential read
	pub fn retrieve_stream(&mut self, position: usize, target: &mut [u8]) -> crate::AResult<()> {
		self.validate_range(position, target.len())?;
		let prefix = self.prefix(position);
		trace!("reading {} byte(s) at 0x{:04x}", target.len(), self.physical_position(position));
		self.transport.write_address(prefix.as_bytes(), Completion::RepeatedStart)?;
		self.transport.read(target)
	}

	/// Write `value` to `length` positions; positions beyond the capacity
	/// are silently dropped.
	pub fn fill(&mut self, position: usize, length: usize, value: u8) -> crate::AResult<()> {
		let available = (self.capacity_bytes() as usize).saturating_sub(position);
		let length = cmp::min(length, available);
		self.validate_range(position, length)?;

		let page_size = self.page_size() as usize;
		let page = vec![value; cmp::min(length, page_size)];
		for chunk in page_chunks(position, length, page_size) {
			self.write_chunk(chunk.position, &page[..chunk.len])?;
		}
		Ok(())
	}

	/// Set every full page to 0xff.
	///
	/// A trailing partial page (capacity not a multiple of the page size)
	/// is not erased.
	pub fn erase(&mut self) -> crate::AResult<()> {
		let page_size = self.page_size() as usize;
		let pages = self.pages() as usize;
		debug!("erasing {} pages of {} bytes", pages, page_size);
		for page in 0..pages {
			self.fill(page * page_size, page_size, ERASED)?;
		}
		let rest = self.capacity_bytes() as usize - pages * page_size;
		if rest != 0 {
			warn!("last {} byte(s) don't fill a page and were not erased", rest);
		}
		Ok(())
	}

	/// Store the in-memory representation of `value` (native endianness)
	pub fn store<V: Pod>(&mut self, position: usize, value: &V) -> crate::AResult<()> {
		self.store_stream(position, bytemuck::bytes_of(value))
	}

	/// Counterpart of [`Memory::store`]
	pub fn retrieve<V: Pod>(&mut self, position: usize) -> crate::AResult<V> {
		let mut value = V::zeroed();
		self.retrieve_stream(position, bytemuck::bytes_of_mut(&mut value))?;
		Ok(value)
	}

	/// Read the byte after the most recently accessed one (no address phase)
	pub fn retrieve_current(&mut self) -> crate::AResult<u8> {
		let mut data = [0u8];
		self.transport.read(&mut data)?;
		Ok(data[0])
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::transport::TransportError;
	use crate::transport::simulated::{
		Call,
		SimulatedChip,
	};

	fn open(max_position: u16, page_size: u16) -> Memory<SimulatedChip> {
		let chip = SimulatedChip::new(max_position as usize + 1, page_size as usize);
		let mut memory = open_memory(chip, MemoryConfiguration::new(max_position, page_size, 0)).unwrap();
		memory.transport_mut().clear_calls();
		memory
	}

	fn pattern(len: usize) -> Vec<u8> {
		(0..len).map(|i| (i * 7 + 3) as u8).collect()
	}

	fn assert_position_error(result: crate::AResult<()>) {
		match result {
			Ok(()) => panic!("expected position error"),
			Err(e) => assert!(e.downcast_ref::<PositionError>().is_some(), "expected position error, got: {}", e),
		}
	}

	#[test]
	fn open_initializes_transport() {
		let memory = open_memory(SimulatedChip::new(64, 16), MemoryConfiguration::new(63, 16, 0)).unwrap();
		assert_eq!(memory.transport().calls(), &[Call::Initialize]);
	}

	#[test]
	fn open_propagates_transport_failure() {
		let mut chip = SimulatedChip::new(64, 16);
		chip.fail_at_call(1);
		let err = match open_memory(chip, MemoryConfiguration::new(63, 16, 0)) {
			Ok(_) => panic!("open must fail"),
			Err(e) => e,
		};
		assert!(err.downcast_ref::<TransportError>().is_some());
	}

	#[test]
	fn store_splits_at_pages() {
		let mut memory = open(127, 16);
		let data = pattern(40);
		memory.store_stream(10, &data).unwrap();

		assert_eq!(memory.transport().write_lengths(), vec![6, 16, 16, 2]);
		let prefixes: Vec<Vec<u8>> = memory.transport().calls().iter().filter_map(|call| match call {
			Call::WritePrefixed { prefix, .. } => Some(prefix.clone()),
			_ => None,
		}).collect();
		assert_eq!(prefixes, vec![vec![0, 10], vec![0, 16], vec![0, 32], vec![0, 48]]);
		assert_eq!(&memory.transport().cells()[10..50], &data[..]);
	}

	#[test]
	fn round_trip() {
		for &position in &[0usize, 16, 5, 15, 100] {
			for &len in &[1usize, 2, 15, 16, 17, 48, 50] {
				let mut memory = open(255, 16);
				let data = pattern(len);
				memory.store_stream(position, &data).unwrap();

				let mut back = vec![0u8; len];
				memory.retrieve_stream(position, &mut back).unwrap();
				assert_eq!(back, data, "round trip of {} bytes at {}", len, position);
			}
		}
	}

	#[test]
	fn retrieve_single_transaction() {
		let mut memory = open(127, 16);
		let mut buf = [0u8; 40];
		memory.retrieve_stream(10, &mut buf).unwrap();
		assert_eq!(memory.transport().calls(), &[
			Call::WriteAddress { address: vec![0, 10], completion: Completion::RepeatedStart },
			Call::Read { len: 40 },
		]);
	}

	#[test]
	fn invalid_range_skips_transport() {
		let mut memory = open(63, 16);
		assert_position_error(memory.store_stream(60, &[0u8; 5]));
		assert_position_error(memory.store_stream(0, &[0u8; 0]));
		let mut buf = [0u8; 65];
		assert_position_error(memory.retrieve_stream(0, &mut buf));
		assert_position_error(memory.retrieve_stream(3, &mut [0u8; 0]));
		assert_position_error(memory.fill(64, 1, 0x00));
		assert!(memory.transport().calls().is_empty());

		memory.store_stream(60, &[0u8; 4]).unwrap();
		memory.validate_range(0, 64).unwrap();
	}

	#[test]
	fn failure_stops_store() {
		let mut memory = open(127, 16);
		memory.transport_mut().fail_at_call(2);
		let err = memory.store_stream(10, &pattern(40)).unwrap_err();
		assert!(err.downcast_ref::<TransportError>().is_some(), "unexpected error: {}", err);

		assert_eq!(memory.transport().calls().len(), 2);
		assert_eq!(memory.transport().write_lengths(), vec![6, 16]);
		// first chunk stays written
		assert_eq!(&memory.transport().cells()[10..16], &pattern(6)[..]);
		assert!(memory.transport().cells()[16..].iter().all(|b| *b == 0xff));
	}

	#[test]
	fn fill_truncates() {
		let mut memory = open(63, 16);
		memory.fill(60, 10, 0x00).unwrap();
		assert_eq!(memory.transport().write_lengths(), vec![4]);
		assert_eq!(&memory.transport().cells()[56..64], &[0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0]);
	}

	#[test]
	fn fill_chunks_like_store() {
		let mut memory = open(127, 16);
		memory.fill(10, 40, 0x5a).unwrap();
		assert_eq!(memory.transport().write_lengths(), vec![6, 16, 16, 2]);
		assert!(memory.transport().cells()[10..50].iter().all(|b| *b == 0x5a));
		assert_eq!(memory.transport().cells()[9], 0xff);
		assert_eq!(memory.transport().cells()[50], 0xff);
	}

	#[test]
	fn erase_writes_pages() {
		let mut memory = open(63, 16);
		for c in memory.transport_mut().cells_mut() {
			*c = 0;
		}
		memory.erase().unwrap();

		let writes: Vec<(Vec<u8>, Vec<u8>)> = memory.transport().calls().iter().filter_map(|call| match call {
			Call::WritePrefixed { prefix, data } => Some((prefix.clone(), data.clone())),
			_ => None,
		}).collect();
		assert_eq!(writes.len(), 4);
		for (page, (prefix, data)) in writes.iter().enumerate() {
			assert_eq!(prefix, &vec![0, (page * 16) as u8]);
			assert_eq!(data, &vec![0xff; 16]);
		}
		assert!(memory.transport().cells().iter().all(|b| *b == 0xff));
	}

	#[test]
	fn erase_skips_partial_page() {
		// 40 bytes, 2 full pages of 16
		let mut memory = open(39, 16);
		for c in memory.transport_mut().cells_mut() {
			*c = 0;
		}
		memory.erase().unwrap();
		assert_eq!(memory.transport().write_lengths(), vec![16, 16]);
		assert!(memory.transport().cells()[..32].iter().all(|b| *b == 0xff));
		assert!(memory.transport().cells()[32..].iter().all(|b| *b == 0x00));
	}

	#[test]
	fn erase_stops_at_failure() {
		let mut memory = open(63, 16);
		memory.transport_mut().fail_at_call(3);
		assert!(memory.erase().is_err());
		assert_eq!(memory.transport().write_lengths(), vec![16, 16, 16]);
	}

	#[test]
	fn typed_values() {
		let mut memory = open(63, 16);

		memory.store(0, &0xa5u8).unwrap();
		assert_eq!(memory.retrieve::<u8>(0).unwrap(), 0xa5);

		memory.store(0, &0xaa55u16).unwrap();
		assert_eq!(memory.retrieve::<u16>(0).unwrap(), 0xaa55);
		assert_eq!(&memory.transport().cells()[0..2], &0xaa55u16.to_ne_bytes());

		memory.store(14, &0x1234_5678i32).unwrap();
		assert_eq!(memory.retrieve::<i32>(14).unwrap(), 0x1234_5678);

		memory.store(0, &123.45f32).unwrap();
		assert_eq!(memory.retrieve::<f32>(0).unwrap(), 123.45f32);

		memory.store(32, &[1u8, 2, 3, 4, 5]).unwrap();
		assert_eq!(memory.retrieve::<[u8; 5]>(32).unwrap(), [1, 2, 3, 4, 5]);

		assert!(memory.store(62, &0u32).is_err());
		assert!(memory.retrieve::<u64>(60).is_err());
	}

	#[test]
	fn current_position_read() {
		let mut memory = open(63, 16);
		memory.store_stream(5, &[1, 2, 3, 4]).unwrap();
		let mut buf = [0u8; 3];
		memory.retrieve_stream(5, &mut buf).unwrap();
		memory.transport_mut().clear_calls();

		assert_eq!(memory.retrieve_current().unwrap(), 4);
		assert_eq!(memory.transport().calls(), &[Call::Read { len: 1 }]);
	}

	#[test]
	fn reserved_area_and_byte_addressing() {
		// DS1307: 64 bytes RAM, first 8 bytes are clock registers
		let chip = SimulatedChip::new(64, 64);
		let mut memory = open_memory(chip, MemoryConfiguration::new(0x3f, 0x3f - 0x08 + 1, 0x08)).unwrap();
		assert!(memory.is_position_in_words());
		memory.set_position_in_bytes();
		assert!(memory.is_position_in_bytes());
		assert_eq!(memory.capacity_bytes(), 56);
		memory.transport_mut().clear_calls();

		memory.store_stream(0, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
		assert_eq!(memory.transport().calls(), &[Call::WritePrefixed {
			prefix: vec![0x08],
			data: vec![0xde, 0xad, 0xbe, 0xef],
		}]);
		assert_eq!(&memory.transport().cells()[0..8], &[0xff; 8]);
		assert_eq!(&memory.transport().cells()[8..12], &[0xde, 0xad, 0xbe, 0xef]);

		memory.store_stream(55, &[0x42]).unwrap();
		assert_eq!(memory.transport().cells()[63], 0x42);
		assert_position_error(memory.store_stream(56, &[0x42]));

		memory.set_position_in_words();
		assert_eq!(memory.retrieve::<u8>(55).unwrap(), 0x42);
	}
}
