// Bitwise engine: a small C-like language for describing packed binary
// structures, and live element views over a shared memory map.
//
// A definition is parsed (grammar), laid out over the map (layout), and
// handed back as a tree of views (elements). Reads and writes through any
// view go straight to the map, so aliasing views always agree.

pub mod bcd;
pub mod elements;
pub mod grammar;
pub mod layout;
pub mod types;

use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

use crate::memmap::MemoryMap;

pub use elements::{
    array_copy, get_string, set_string, ArrayElement, BcdElement, BitElement, CharElement,
    DataElement, IntElement, StructElement, Value,
};
pub use grammar::parse_definition;
pub use layout::Processor;
pub use types::{Endianness, ScalarType};

/// Shared handle to the byte buffer all element views alias
pub type MemRef = Rc<RefCell<MemoryMap>>;

#[derive(Error, Debug)]
pub enum BitwiseError {
    /// Malformed definition text, or a definition-level rule violation
    /// caught during layout
    #[error("definition syntax error: {0}")]
    Syntax(String),

    /// A bulk operation received the wrong number of items or bytes
    #[error("cardinality mismatch: expected {expected}, got {actual}")]
    Cardinality { expected: usize, actual: usize },

    /// The operation is not defined for this element type
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// An element span falls outside the memory map
    #[error("range [{offset:#x}, {offset:#x}+{len}) exceeds the {extent}-byte map")]
    Bounds {
        offset: usize,
        len: usize,
        extent: usize,
    },

    /// A value cannot be represented by the target element
    #[error("value out of range: {0}")]
    ValueRange(String),

    /// Field lookup failed
    #[error("no field `{name}` in struct `{parent}`")]
    UnknownField { name: String, parent: String },

    /// A search found no matching element
    #[error("no matching element")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, BitwiseError>;

/// Parse @definition and lay it out over @mem starting at @offset,
/// returning the root struct of element views.
pub fn parse(definition: &str, mem: &MemRef, offset: usize) -> Result<StructElement> {
    let decls = grammar::parse_definition(definition)?;
    Processor::new(mem, offset).run(&decls)
}

/// Convenience wrapper: copy @data into a fresh shared memory map and
/// parse @definition over it from offset 0.
pub fn parse_bytes(definition: &str, data: &[u8]) -> Result<(StructElement, MemRef)> {
    let mem = MemoryMap::new(data.to_vec()).into_shared();
    let root = parse(definition, &mem, 0)?;
    Ok((root, mem))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MYSTRUCT_DEFN: &str = "
        struct {
            u8 foo;
            u8 highbit:1,
               sixzeros:6,
               lowbit:1;
            char string[3];
            bbcd fourdigits[2];
        } mystruct;
    ";
    const MYSTRUCT_DATA: &[u8] = b"\xAB\x7Fabc\x12\x34";

    #[test]
    fn test_mystruct_read() {
        let (root, _mem) = parse_bytes(MYSTRUCT_DEFN, MYSTRUCT_DATA).unwrap();
        let s = root.field("mystruct").unwrap().as_struct().unwrap();

        assert_eq!(s.field("foo").unwrap().as_int().unwrap(), 0xAB);
        assert_eq!(s.field("highbit").unwrap().as_int().unwrap(), 0);
        assert_eq!(s.field("sixzeros").unwrap().as_int().unwrap(), 63);
        assert_eq!(s.field("lowbit").unwrap().as_int().unwrap(), 1);
        assert_eq!(s.field("string").unwrap().as_string().unwrap(), "abc");
        assert_eq!(s.field("fourdigits").unwrap().as_int().unwrap(), 1234);
        assert_eq!(s.size(), MYSTRUCT_DATA.len() * 8);
    }

    #[test]
    fn test_mystruct_write() {
        let (root, mem) = parse_bytes(MYSTRUCT_DEFN, MYSTRUCT_DATA).unwrap();
        let s = root.field("mystruct").unwrap().as_struct().unwrap();

        s.field("foo").unwrap().set_int(0x12).unwrap();
        s.field("highbit").unwrap().set_int(1).unwrap();
        s.field("sixzeros").unwrap().set_int(0).unwrap();
        s.field("string").unwrap().set_string("xyz").unwrap();
        s.field("fourdigits").unwrap().set_int(9876).unwrap();

        assert_eq!(mem.borrow().get_packed(), b"\x12\x81xyz\x98\x76");
    }

    #[test]
    fn test_lbcd_digit_order() {
        let (root, mem) = parse_bytes("lbcd foo[2];", &[0x12, 0x34]).unwrap();
        let foo = root.field("foo").unwrap();
        assert_eq!(foo.as_int().unwrap(), 3412);

        foo.set_int(1234).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0x34, 0x12]);
    }

    #[test]
    fn test_bcd_array_set_from_value() {
        let (root, mem) = parse_bytes("bbcd n[3];", &[0; 3]).unwrap();
        root.field("n").unwrap().set_value(&Value::Int(12345)).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0x01, 0x23, 0x45]);
        assert!(root.field("n").unwrap().set_value(&Value::Int(-5)).is_err());
    }

    #[test]
    fn test_endian_pairs_diverge() {
        let data = &[0x01, 0x02, 0x03, 0x04];
        let (big, _mem) = parse_bytes("u32 v;", data).unwrap();
        let (little, _mem) = parse_bytes("ul32 v;", data).unwrap();
        assert_eq!(big.field("v").unwrap().as_int().unwrap(), 0x01020304);
        assert_eq!(little.field("v").unwrap().as_int().unwrap(), 0x04030201);
    }

    #[test]
    fn test_signed_scalars() {
        let (root, _mem) = parse_bytes("i8 a; il16 b;", &[0xFF, 0xFE, 0xFF]).unwrap();
        assert_eq!(root.field("a").unwrap().as_int().unwrap(), -1);
        assert_eq!(root.field("b").unwrap().as_int().unwrap(), -2);
    }

    #[test]
    fn test_il32() {
        let (root, mem) = parse_bytes("il32 v;", &[0xFE, 0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(root.field("v").unwrap().as_int().unwrap(), -2);
        root.field("v").unwrap().set_int(0x01020304).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_whole_image_round_trip() {
        let defn = "struct { u8 a; u16 b; char s[2]; } top; bbcd d[2];";
        let data = b"\x01\x02\x03ab\x56\x78";
        let (root, mem) = parse_bytes(defn, data).unwrap();

        assert_eq!(root.size(), data.len() * 8);
        assert_eq!(root.get_raw().unwrap(), data);

        root.set_raw(b"\x09\x08\x07cd\x11\x22").unwrap();
        assert_eq!(root.get_path("top.b").unwrap().as_int().unwrap(), 0x0807);
        assert_eq!(root.get_path("top.s").unwrap().as_string().unwrap(), "cd");
        assert_eq!(root.field("d").unwrap().as_int().unwrap(), 1122);
        assert_eq!(mem.borrow().get_packed(), b"\x09\x08\x07cd\x11\x22");
    }

    #[test]
    fn test_definitions_share_one_map() {
        let mem = MemoryMap::new(vec![0x12, 0x34]).into_shared();
        let first = parse("u16 word;", &mem, 0).unwrap();
        let second = parse("u8 hi; u8 lo;", &mem, 0).unwrap();

        first.field("word").unwrap().set_int(0xBEEF).unwrap();
        assert_eq!(second.field("hi").unwrap().as_int().unwrap(), 0xBE);
        assert_eq!(second.field("lo").unwrap().as_int().unwrap(), 0xEF);
    }

    #[test]
    fn test_error_messages() {
        let err = parse_bytes("u8 foo", &[0]).err().unwrap();
        assert!(err.to_string().contains("syntax"), "{}", err);

        let err = parse_bytes("u32 v;", &[0, 0]).err().unwrap();
        assert!(err.to_string().contains("2-byte map"), "{}", err);
    }
}
