/// Requested range is empty or doesn't fit into the memory
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Fail)]
#[fail(display = "invalid position range: {} byte(s) at position {} (capacity {} bytes)", length, position, capacity)]
pub struct PositionError {
	pub position: usize,
	pub length: usize,
	pub capacity: u32,
}

/// Part of a transfer that stays within one page
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Chunk {
	/// logical position to start at
	pub position: usize,
	/// offset into the caller's buffer
	pub offset: usize,
	pub len: usize,
}

/// Splits `length` bytes starting at `position` at page boundaries
///
/// The first chunk ends at the next page boundary (or the end of the
/// transfer); all following chunks are full pages, except maybe the last.
/// A page size of 0 is treated as 1.
pub fn page_chunks(position: usize, length: usize, page_size: usize) -> PageChunks {
	PageChunks {
		position,
		offset: 0,
		remaining: length,
		page_size: if page_size == 0 { 1 } else { page_size },
	}
}

#[derive(Clone, Debug)]
pub struct PageChunks {
	position: usize,
	offset: usize,
	remaining: usize,
	page_size: usize,
}

impl Iterator for PageChunks {
	type Item = Chunk;

	fn next(&mut self) -> Option<Self::Item> {
		if 0 == self.remaining {
			return None;
		}
		let to_boundary = self.page_size - self.position % self.page_size;
		let len = if self.remaining < to_boundary { self.remaining } else { to_boundary };
		let chunk = Chunk {
			position: self.position,
			offset: self.offset,
			len,
		};
		self.position += len;
		self.offset += len;
		self.remaining -= len;
		Some(chunk)
	}
}

#[cfg(test)]
mod test {
	use super::page_chunks;

	fn check_chunks(position: usize, length: usize, page_size: usize, expected: &[usize]) {
		let chunks: Vec<_> = page_chunks(position, length, page_size).collect();
		let lengths: Vec<usize> = chunks.iter().map(|c| c.len).collect();
		assert_eq!(&lengths[..], expected, "chunking {}+{} with page size {}", position, length, page_size);

		let mut next = position;
		for c in &chunks {
			assert_eq!(c.position, next);
			assert_eq!(c.offset, next - position);
			assert_eq!(c.position / page_size, (c.position + c.len - 1) / page_size, "chunk {:?} crosses a page boundary", c);
			next += c.len;
		}
		assert_eq!(next, position + length);
	}

	#[test]
	fn chunking() {
		check_chunks(10, 40, 16, &[6, 16, 16, 2]);
		check_chunks(0, 40, 16, &[16, 16, 8]);
		check_chunks(0, 32, 16, &[16, 16]);
		check_chunks(15, 1, 16, &[1]);
		check_chunks(15, 2, 16, &[1, 1]);
		check_chunks(3, 5, 16, &[5]);
		check_chunks(5, 3, 1, &[1, 1, 1]);
		check_chunks(0x7fc0, 0x40, 64, &[64]);
		check_chunks(7, 0, 16, &[]);
	}

	#[test]
	fn zero_page_size() {
		let lengths: Vec<usize> = page_chunks(0, 4, 0).map(|c| c.len).collect();
		assert_eq!(lengths, vec![1, 1, 1, 1]);
	}
}
