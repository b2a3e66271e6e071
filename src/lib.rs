// bitwise-rs: declarative parsing of packed binary structures.
//
// A C-like definition language describes the layout of a byte buffer;
// parsing it yields a tree of live element views that read and write the
// buffer in place.

pub mod bitwise;
pub mod memmap;

pub use bitwise::{
    parse, parse_bytes, BitwiseError, DataElement, MemRef, StructElement, Value,
};
pub use memmap::MemoryMap;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
