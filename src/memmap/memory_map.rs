// Memory map: the single mutable byte buffer backing a parsed structure tree
// Every data element produced by the bitwise engine aliases a sub-range of
// one of these; there is no caching anywhere, so a write through any view is
// immediately visible to every other view.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryMapError {
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),
}

pub type Result<T> = std::result::Result<T, MemoryMapError>;

/// Byte-oriented storage for a device memory image
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMap {
    data: Vec<u8>,
}

impl MemoryMap {
    /// Create a new memory map from bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Create a new memory map of @size zero bytes
    pub fn new_with_size(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Create a new empty memory map
    pub fn new_empty() -> Self {
        Self { data: Vec::new() }
    }

    /// Wrap this map in the shared, interior-mutable handle the bitwise
    /// engine expects. All data elements parsed over the handle alias the
    /// same buffer.
    pub fn into_shared(self) -> Rc<RefCell<MemoryMap>> {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a chunk of memory from @start for @length bytes, or through the
    /// end of the map if @length is None
    pub fn get(&self, start: usize, length: Option<usize>) -> Result<&[u8]> {
        if start > self.data.len() {
            return Err(MemoryMapError::IndexOutOfBounds(start));
        }

        match length {
            Some(len) => {
                let end = start
                    .checked_add(len)
                    .ok_or(MemoryMapError::IndexOutOfBounds(usize::MAX))?;
                if end > self.data.len() {
                    return Err(MemoryMapError::IndexOutOfBounds(end));
                }
                Ok(&self.data[start..end])
            }
            None => Ok(&self.data[start..]),
        }
    }

    /// Set a byte at position @pos to @value
    pub fn set_byte(&mut self, pos: usize, value: u8) -> Result<()> {
        if pos >= self.data.len() {
            return Err(MemoryMapError::IndexOutOfBounds(pos));
        }
        self.data[pos] = value;
        Ok(())
    }

    /// Set a chunk of bytes starting at @pos
    pub fn set_bytes(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let end = pos
            .checked_add(bytes.len())
            .ok_or(MemoryMapError::IndexOutOfBounds(usize::MAX))?;
        if end > self.data.len() {
            return Err(MemoryMapError::IndexOutOfBounds(end));
        }
        self.data[pos..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Get the entire memory map as raw bytes
    pub fn get_packed(&self) -> &[u8] {
        &self.data
    }

    /// Get the entire memory map as an owned Vec<u8>
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Truncate the memory map to @size bytes
    pub fn truncate(&mut self, size: usize) {
        self.data.truncate(size);
    }

    /// Append @bytes to the end of the map
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Grow the map to at least @size bytes, zero-filling the new tail.
    /// Shrinking is done with truncate(), not here.
    pub fn grow(&mut self, size: usize) {
        if size > self.data.len() {
            self.data.resize(size, 0);
        }
    }

    /// Get a printable hex representation of part of the map
    pub fn printable(&self, start: Option<usize>, end: Option<usize>) -> String {
        let start = start.unwrap_or(0).min(self.data.len());
        let end = end.unwrap_or(self.data.len()).min(self.data.len());
        hexdump(&self.data[start..end])
    }
}

impl From<Vec<u8>> for MemoryMap {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for MemoryMap {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl AsRef<[u8]> for MemoryMap {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryMap({} bytes)", self.data.len())
    }
}

/// Create a hex dump of bytes (similar to hexdump -C)
fn hexdump(data: &[u8]) -> String {
    let mut output = String::new();

    for (i, chunk) in data.chunks(16).enumerate() {
        output.push_str(&format!("{:08x}  ", i * 16));

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                output.push(' ');
            }
            output.push_str(&format!("{:02x} ", byte));
        }

        if chunk.len() < 16 {
            for j in chunk.len()..16 {
                if j == 8 {
                    output.push(' ');
                }
                output.push_str("   ");
            }
        }

        output.push_str(" |");
        for byte in chunk {
            if *byte >= 0x20 && *byte <= 0x7e {
                output.push(*byte as char);
            } else {
                output.push('.');
            }
        }
        output.push_str("|\n");
    }

    output
}
