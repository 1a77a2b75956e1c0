use std::fmt;

use super::position::PositionError;

/// How many bytes a physical position takes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressWidth {
	One,
	Two,
}

impl AddressWidth {
	pub fn len(self) -> usize {
		match self {
			AddressWidth::One => 1,
			AddressWidth::Two => 2,
		}
	}

	// most significant byte first; with one address byte chips map the
	// upper position bits into the device address, so those get cut off here
	pub fn encode(self, position: usize) -> AddressPrefix {
		match self {
			AddressWidth::One => AddressPrefix {
				bytes: [position as u8, 0],
				len: 1,
			},
			AddressWidth::Two => AddressPrefix {
				bytes: [(position >> 8) as u8, position as u8],
				len: 2,
			},
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AddressPrefix {
	bytes: [u8; 2],
	len: usize,
}

impl AddressPrefix {
	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes[..self.len]
	}
}

/// Geometry of a memory chip as seen through the logical positions
///
/// Logical position 0 is the physical position `min_position`; the last
/// usable logical position is `max_position`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MemoryConfiguration {
	min_position: u16,
	max_position: u16,
	page_size: u16,
	address_width: AddressWidth,
}

impl MemoryConfiguration {
	/// `max_position` is the highest physical position to use, usually the
	/// capacity minus one. A `min_position` beyond it is clamped, a zero
	/// `page_size` treated as 1.
	pub fn new(max_position: u16, page_size: u16, min_position: u16) -> Self {
		let min_position = if min_position > max_position { max_position } else { min_position };
		MemoryConfiguration {
			min_position,
			max_position: max_position - min_position,
			page_size: if page_size == 0 { 1 } else { page_size },
			address_width: AddressWidth::Two,
		}
	}

	pub fn with_address_width(mut self, address_width: AddressWidth) -> Self {
		self.address_width = address_width;
		self
	}

	pub fn min_position(&self) -> u16 {
		self.min_position
	}

	pub fn max_position(&self) -> u16 {
		self.max_position
	}

	pub fn page_size(&self) -> u16 {
		self.page_size
	}

	pub fn address_width(&self) -> AddressWidth {
		self.address_width
	}

	pub fn set_address_width(&mut self, address_width: AddressWidth) {
		self.address_width = address_width;
	}

	pub fn capacity_bytes(&self) -> u32 {
		self.max_position as u32 + 1
	}

	pub fn capacity_bits(&self) -> u32 {
		self.capacity_bytes() << 3
	}

	pub fn capacity_kibytes(&self) -> u32 {
		self.capacity_bytes() >> 10
	}

	pub fn capacity_kibits(&self) -> u32 {
		self.capacity_kibytes() << 3
	}

	// a trailing partial page doesn't count
	pub fn pages(&self) -> u32 {
		self.capacity_bytes() / self.page_size as u32
	}

	// no bounds check; positions past usize::MAX wrap around
	pub fn physical_position(&self, logical_position: usize) -> usize {
		logical_position.wrapping_add(self.min_position as usize)
	}

	pub fn validate_range(&self, position: usize, length: usize) -> Result<(), PositionError> {
		let capacity = self.capacity_bytes();
		let fits = match position.checked_add(length) {
			Some(end) => end <= capacity as usize,
			None => false,
		};
		if length == 0 || !fits {
			return Err(PositionError {
				position,
				length,
				capacity,
			});
		}
		Ok(())
	}
}

impl fmt::Display for MemoryConfiguration {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f,
			"{} bytes at 0x{:04x}..=0x{:04x}, {} pages of {} bytes, {:?} address byte(s)",
			self.capacity_bytes(),
			self.min_position,
			self.min_position as u32 + self.max_position as u32,
			self.pages(),
			self.page_size,
			self.address_width,
		)
	}
}
