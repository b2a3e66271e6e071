// Data element views: live, bidirectionally-mutable windows onto sub-ranges
// of a shared memory map. No element ever copies or caches bytes; every
// get re-reads the map and every set writes straight through, so views that
// alias overlapping bytes (a bitfield and its backing byte, union members,
// a struct and its fields) always agree.

use super::bcd;
use super::types::{decode_int, encode_int, Endianness, ScalarType};
use super::{BitwiseError, MemRef, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::rc::Rc;

/// Semantic value of an element, as returned by get_value()
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Char(char),
    String(String),
    /// One BCD byte as its (tens, units) digit pair
    Bcd(u8, u8),
    List(Vec<Value>),
    /// Struct fields in declaration order
    Map(Vec<(String, Value)>),
}

// Manual impl so Map serializes as a JSON object in field-declaration
// order and Bcd collapses to its two-digit integer.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Char(c) => serializer.serialize_char(*c),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bcd(tens, units) => serializer.serialize_u8(tens * 10 + units),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

fn check_extent(mem: &MemRef, offset: usize, len: usize) -> Result<()> {
    let extent = mem.borrow().len();
    match offset.checked_add(len) {
        Some(end) if end <= extent => Ok(()),
        // overflow (a seek near usize::MAX) is out of bounds too
        _ => Err(BitwiseError::Bounds {
            offset,
            len,
            extent,
        }),
    }
}

fn read_bytes(mem: &MemRef, offset: usize, len: usize) -> Result<Vec<u8>> {
    let map = mem.borrow();
    let extent = map.len();
    map.get(offset, Some(len))
        .map(|bytes| bytes.to_vec())
        .map_err(|_| BitwiseError::Bounds {
            offset,
            len,
            extent,
        })
}

fn write_bytes(mem: &MemRef, offset: usize, data: &[u8]) -> Result<()> {
    let mut map = mem.borrow_mut();
    let extent = map.len();
    map.set_bytes(offset, data).map_err(|_| BitwiseError::Bounds {
        offset,
        len: data.len(),
        extent,
    })
}

fn check_raw_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(BitwiseError::Cardinality { expected, actual });
    }
    Ok(())
}

/// Mask covering bits [start, end), e.g. bits_between(4, 8) == 0xF0
fn bits_between(start: usize, end: usize) -> u64 {
    ((1u64 << (end - start)) - 1) << start
}

/// Fixed-width integer view: 1-4 bytes, signed or unsigned, either byte
/// order. Decoding never relies on native word size.
#[derive(Debug, Clone)]
pub struct IntElement {
    mem: MemRef,
    offset: usize,
    width: usize,
    signed: bool,
    endian: Endianness,
}

impl IntElement {
    pub(crate) fn new(mem: &MemRef, offset: usize, dtype: ScalarType) -> Result<Self> {
        let width = dtype.size_bytes();
        check_extent(mem, offset, width)?;
        Ok(Self {
            mem: Rc::clone(mem),
            offset,
            width,
            signed: dtype.is_signed(),
            endian: dtype.endianness(),
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bit width of the view
    pub fn size(&self) -> usize {
        self.width * 8
    }

    pub fn as_int(&self) -> Result<i64> {
        let raw = read_bytes(&self.mem, self.offset, self.width)?;
        Ok(decode_int(&raw, self.signed, self.endian))
    }

    /// Encode @value into the backing bytes, masking to the declared width
    pub fn set_int(&self, value: i64) -> Result<()> {
        write_bytes(
            &self.mem,
            self.offset,
            &encode_int(value, self.width, self.endian),
        )
    }

    pub fn get_raw(&self) -> Result<Vec<u8>> {
        read_bytes(&self.mem, self.offset, self.width)
    }

    pub fn set_raw(&self, data: &[u8]) -> Result<()> {
        check_raw_len(self.width, data.len())?;
        write_bytes(&self.mem, self.offset, data)
    }
}

/// Single-byte character view
#[derive(Debug, Clone)]
pub struct CharElement {
    mem: MemRef,
    offset: usize,
}

impl CharElement {
    pub(crate) fn new(mem: &MemRef, offset: usize) -> Result<Self> {
        check_extent(mem, offset, 1)?;
        Ok(Self {
            mem: Rc::clone(mem),
            offset,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        8
    }

    pub fn as_char(&self) -> Result<char> {
        let raw = read_bytes(&self.mem, self.offset, 1)?;
        Ok(raw[0] as char)
    }

    pub fn byte(&self) -> Result<u8> {
        Ok(read_bytes(&self.mem, self.offset, 1)?[0])
    }

    /// Only code points 0-255 fit in one byte
    pub fn set_char(&self, c: char) -> Result<()> {
        let code = c as u32;
        if code > 0xFF {
            return Err(BitwiseError::ValueRange(format!(
                "character {:?} does not fit in one byte",
                c
            )));
        }
        write_bytes(&self.mem, self.offset, &[code as u8])
    }

    pub fn get_raw(&self) -> Result<Vec<u8>> {
        read_bytes(&self.mem, self.offset, 1)
    }

    pub fn set_raw(&self, data: &[u8]) -> Result<()> {
        check_raw_len(1, data.len())?;
        write_bytes(&self.mem, self.offset, data)
    }
}

/// One BCD byte: two decimal digits packed as nibbles. The digit order
/// tag only matters when the element is part of an array.
#[derive(Debug, Clone)]
pub struct BcdElement {
    mem: MemRef,
    offset: usize,
    digit_order: Endianness,
}

impl BcdElement {
    pub(crate) fn new(mem: &MemRef, offset: usize, digit_order: Endianness) -> Result<Self> {
        check_extent(mem, offset, 1)?;
        Ok(Self {
            mem: Rc::clone(mem),
            offset,
            digit_order,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        8
    }

    pub fn digit_order(&self) -> Endianness {
        self.digit_order
    }

    /// (tens, units) nibbles. Reads are permissive: non-decimal nibbles
    /// come back as-is so callers can inspect flag bits stored in BCD
    /// fields, the way several vendor formats do.
    pub fn digits(&self) -> Result<(u8, u8)> {
        let byte = read_bytes(&self.mem, self.offset, 1)?[0];
        Ok(bcd::split_digits(byte))
    }

    pub fn as_int(&self) -> Result<i64> {
        let (tens, units) = self.digits()?;
        Ok((tens * 10 + units) as i64)
    }

    /// Writes are strict: only 0-99 encodes as two decimal digits
    pub fn set_int(&self, value: i64) -> Result<()> {
        if !(0..=99).contains(&value) {
            return Err(BitwiseError::ValueRange(format!(
                "BCD byte cannot hold {}",
                value
            )));
        }
        let byte = bcd::pack_digits((value / 10) as u8, (value % 10) as u8)?;
        write_bytes(&self.mem, self.offset, &[byte])
    }

    pub fn get_raw(&self) -> Result<Vec<u8>> {
        read_bytes(&self.mem, self.offset, 1)
    }

    pub fn set_raw(&self, data: &[u8]) -> Result<()> {
        check_raw_len(1, data.len())?;
        write_bytes(&self.mem, self.offset, data)
    }
}

/// A sub-range of bits inside a byte-aligned backing integer. `shift` is
/// the remaining-bits count before this field: the field occupies bits
/// [shift-width, shift) of the backing value.
#[derive(Debug, Clone)]
pub struct BitElement {
    mem: MemRef,
    offset: usize,
    width: usize,
    shift: usize,
    backing: ScalarType,
}

impl BitElement {
    pub(crate) fn new(
        mem: &MemRef,
        offset: usize,
        width: usize,
        shift: usize,
        backing: ScalarType,
    ) -> Result<Self> {
        check_extent(mem, offset, backing.size_bytes())?;
        Ok(Self {
            mem: Rc::clone(mem),
            offset,
            width,
            shift,
            backing,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Width of the field itself, not the backing integer. Summing child
    /// sizes therefore yields correct aggregate struct sizes.
    pub fn size(&self) -> usize {
        self.width
    }

    pub fn backing_bytes(&self) -> usize {
        self.backing.size_bytes()
    }

    fn backing_value(&self) -> Result<u64> {
        let raw = read_bytes(&self.mem, self.offset, self.backing.size_bytes())?;
        Ok(decode_int(&raw, false, self.backing.endianness()) as u64)
    }

    pub fn as_int(&self) -> Result<i64> {
        let data = self.backing_value()?;
        let mask = bits_between(self.shift - self.width, self.shift);
        Ok(((data & mask) >> (self.shift - self.width)) as i64)
    }

    /// Read-modify-write of the whole backing integer, so sibling fields
    /// sharing the same bytes are preserved. The value is masked to the
    /// field width.
    pub fn set_int(&self, value: i64) -> Result<()> {
        let data = self.backing_value()?;
        let mask = bits_between(self.shift - self.width, self.shift);
        let merged = (data & !mask) | (((value as u64) << (self.shift - self.width)) & mask);
        write_bytes(
            &self.mem,
            self.offset,
            &encode_int(merged as i64, self.backing.size_bytes(), self.backing.endianness()),
        )
    }

    /// Raw access covers the full backing bytes, not just this field
    pub fn get_raw(&self) -> Result<Vec<u8>> {
        read_bytes(&self.mem, self.offset, self.backing.size_bytes())
    }

    pub fn set_raw(&self, data: &[u8]) -> Result<()> {
        check_raw_len(self.backing.size_bytes(), data.len())?;
        write_bytes(&self.mem, self.offset, data)
    }
}

/// Ordered, fixed-length, homogeneous sequence of elements. Length is
/// fixed once layout finishes; only element values may change.
#[derive(Debug, Clone)]
pub struct ArrayElement {
    mem: MemRef,
    offset: usize,
    items: Vec<DataElement>,
}

impl ArrayElement {
    pub(crate) fn new(mem: &MemRef, offset: usize, items: Vec<DataElement>) -> Self {
        Self {
            mem: Rc::clone(mem),
            offset,
            items,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DataElement> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataElement> {
        self.items.iter()
    }

    /// Sum of child sizes in bits; exact for bit arrays too
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.size()).sum()
    }

    pub fn get_value(&self) -> Result<Value> {
        let values = self
            .items
            .iter()
            .map(|item| item.get_value())
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::List(values))
    }

    /// Bulk set. Lists must match the array length exactly; a string sets
    /// a char array, an integer sets a BCD array.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        match (self.items.first(), value) {
            (Some(DataElement::Char(_)), Value::String(s)) => self.set_string(s),
            (Some(DataElement::Bcd(_)), Value::Int(n)) => {
                if *n < 0 {
                    return Err(BitwiseError::ValueRange(format!(
                        "BCD array cannot hold negative value {}",
                        n
                    )));
                }
                self.set_int(*n as u64)
            }
            (_, Value::List(values)) => {
                check_raw_len(self.items.len(), values.len())?;
                for (item, v) in self.items.iter().zip(values) {
                    item.set_value(v)?;
                }
                Ok(())
            }
            _ => Err(BitwiseError::Unsupported(
                "array set_value expects a list, a string (char array), \
                 or an integer (BCD array)",
            )),
        }
    }

    /// Index of the first element whose value equals @value
    pub fn position(&self, value: &Value) -> Result<usize> {
        for (index, item) in self.items.iter().enumerate() {
            if item.get_value()? == *value {
                return Ok(index);
            }
        }
        Err(BitwiseError::NotFound)
    }

    pub fn as_string(&self) -> Result<String> {
        let mut out = String::with_capacity(self.items.len());
        for item in &self.items {
            match item {
                DataElement::Char(c) => out.push(c.as_char()?),
                _ => return Err(BitwiseError::Unsupported("not a char array")),
            }
        }
        Ok(out)
    }

    pub fn set_string(&self, s: &str) -> Result<()> {
        let chars: Vec<char> = s.chars().collect();
        check_raw_len(self.items.len(), chars.len())?;
        for (item, c) in self.items.iter().zip(chars) {
            match item {
                DataElement::Char(el) => el.set_char(c)?,
                _ => return Err(BitwiseError::Unsupported("not a char array")),
            }
        }
        Ok(())
    }

    fn digit_order(&self) -> Result<Endianness> {
        match self.items.first() {
            Some(DataElement::Bcd(el)) => Ok(el.digit_order()),
            _ => Err(BitwiseError::Unsupported("not a BCD array")),
        }
    }

    /// Concatenate digit pairs into one integer, respecting the array's
    /// declared digit order (bbcd reads first byte as most significant)
    pub fn as_int(&self) -> Result<u64> {
        let order = self.digit_order()?;
        let mut value: u64 = 0;
        let items: Vec<&DataElement> = match order {
            Endianness::Big => self.items.iter().collect(),
            Endianness::Little => self.items.iter().rev().collect(),
        };
        for item in items {
            match item {
                DataElement::Bcd(el) => {
                    let (tens, units) = el.digits()?;
                    value = value
                        .checked_mul(100)
                        .and_then(|v| v.checked_add((tens * 10 + units) as u64))
                        .ok_or_else(|| {
                            BitwiseError::ValueRange(format!(
                                "{}-byte BCD array value does not fit in 64 bits",
                                self.items.len()
                            ))
                        })?;
                }
                _ => return Err(BitwiseError::Unsupported("not a BCD array")),
            }
        }
        Ok(value)
    }

    /// Decompose @value into one digit pair per element. Driven purely by
    /// element count; digits beyond the array's capacity are dropped.
    pub fn set_int(&self, value: u64) -> Result<()> {
        let order = self.digit_order()?;
        let items: Vec<&DataElement> = match order {
            Endianness::Big => self.items.iter().rev().collect(),
            Endianness::Little => self.items.iter().collect(),
        };
        let mut remaining = value;
        for item in items {
            match item {
                DataElement::Bcd(el) => {
                    el.set_int((remaining % 100) as i64)?;
                    remaining /= 100;
                }
                _ => return Err(BitwiseError::Unsupported("not a BCD array")),
            }
        }
        Ok(())
    }

    /// The packed bytes of the whole span, [offset, offset + size()/8)
    pub fn get_raw(&self) -> Result<Vec<u8>> {
        read_bytes(&self.mem, self.offset, self.size() / 8)
    }

    pub fn set_raw(&self, data: &[u8]) -> Result<()> {
        check_raw_len(self.size() / 8, data.len())?;
        write_bytes(&self.mem, self.offset, data)
    }
}

impl<'a> IntoIterator for &'a ArrayElement {
    type Item = &'a DataElement;
    type IntoIter = std::slice::Iter<'a, DataElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Named-field mapping with insertion-ordered iteration. Also represents
/// unions, which report one member's size instead of the field sum.
#[derive(Debug, Clone)]
pub struct StructElement {
    mem: MemRef,
    offset: usize,
    name: String,
    fields: Vec<(String, DataElement)>,
    union_bits: Option<usize>,
}

impl StructElement {
    pub(crate) fn new(mem: &MemRef, offset: usize, name: &str) -> Self {
        Self {
            mem: Rc::clone(mem),
            offset,
            name: name.to_string(),
            fields: Vec::new(),
            union_bits: None,
        }
    }

    pub(crate) fn push_field(&mut self, name: &str, element: DataElement) {
        self.fields.push((name.to_string(), element));
    }

    pub(crate) fn set_union_bits(&mut self, bits: usize) {
        self.union_bits = Some(bits);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn field(&self, name: &str) -> Result<&DataElement> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, el)| el)
            .ok_or_else(|| BitwiseError::UnknownField {
                name: name.to_string(),
                parent: self.name.clone(),
            })
    }

    /// Set an existing field's value
    pub fn set_field(&self, name: &str, value: &Value) -> Result<()> {
        self.field(name)?.set_value(value)
    }

    /// Fields in declaration order
    pub fn items(&self) -> impl Iterator<Item = (&str, &DataElement)> {
        self.fields.iter().map(|(n, el)| (n.as_str(), el))
    }

    /// Sum of field sizes in bits, except unions which report the size of
    /// one overlaid member
    pub fn size(&self) -> usize {
        match self.union_bits {
            Some(bits) => bits,
            None => self.fields.iter().map(|(_, el)| el.size()).sum(),
        }
    }

    pub fn byte_size(&self) -> usize {
        self.size() / 8
    }

    pub fn get_value(&self) -> Result<Value> {
        let mut out = Vec::with_capacity(self.fields.len());
        for (name, element) in &self.fields {
            out.push((name.clone(), element.get_value()?));
        }
        Ok(Value::Map(out))
    }

    pub fn get_raw(&self) -> Result<Vec<u8>> {
        read_bytes(&self.mem, self.offset, self.byte_size())
    }

    /// Replace the struct's whole byte range; the buffer length must
    /// match the computed size exactly
    pub fn set_raw(&self, data: &[u8]) -> Result<()> {
        check_raw_len(self.byte_size(), data.len())?;
        write_bytes(&self.mem, self.offset, data)
    }

    pub fn fill_raw(&self, byte: u8) -> Result<()> {
        self.set_raw(&vec![byte; self.byte_size()])
    }

    /// Walk a symbolic path like `mystruct.foo[2].field1` starting from
    /// this struct's fields
    pub fn get_path(&self, path: &str) -> Result<&DataElement> {
        let path = path.strip_prefix('.').unwrap_or(path);
        let end = path.find(['.', '[']).unwrap_or(path.len());
        if end == 0 {
            return Err(BitwiseError::Syntax(format!("bad element path `{}`", path)));
        }
        let (name, rest) = path.split_at(end);
        self.field(name)?.get_path(rest)
    }
}

/// Read a char array as a string
pub fn get_string(array: &ArrayElement) -> Result<String> {
    array.as_string()
}

/// Write @s into a char array; the lengths must match exactly
pub fn set_string(array: &ArrayElement, s: &str) -> Result<()> {
    array.set_string(s)
}

/// Copy @src's element values into @dst, index by index
pub fn array_copy(dst: &ArrayElement, src: &ArrayElement) -> Result<()> {
    if dst.len() != src.len() {
        return Err(BitwiseError::Cardinality {
            expected: dst.len(),
            actual: src.len(),
        });
    }
    for (d, s) in dst.iter().zip(src.iter()) {
        d.set_value(&s.get_value()?)?;
    }
    Ok(())
}

/// The closed set of view variants produced by the layout engine
#[derive(Debug, Clone)]
pub enum DataElement {
    Int(IntElement),
    Char(CharElement),
    Bcd(BcdElement),
    Bit(BitElement),
    Array(ArrayElement),
    Struct(StructElement),
}

impl DataElement {
    pub fn offset(&self) -> usize {
        match self {
            DataElement::Int(el) => el.offset(),
            DataElement::Char(el) => el.offset(),
            DataElement::Bcd(el) => el.offset(),
            DataElement::Bit(el) => el.offset(),
            DataElement::Array(el) => el.offset(),
            DataElement::Struct(el) => el.offset(),
        }
    }

    /// Size in bits
    pub fn size(&self) -> usize {
        match self {
            DataElement::Int(el) => el.size(),
            DataElement::Char(el) => el.size(),
            DataElement::Bcd(el) => el.size(),
            DataElement::Bit(el) => el.size(),
            DataElement::Array(el) => el.size(),
            DataElement::Struct(el) => el.size(),
        }
    }

    pub fn get_value(&self) -> Result<Value> {
        match self {
            DataElement::Int(el) => Ok(Value::Int(el.as_int()?)),
            DataElement::Char(el) => Ok(Value::Char(el.as_char()?)),
            DataElement::Bcd(el) => {
                let (tens, units) = el.digits()?;
                Ok(Value::Bcd(tens, units))
            }
            DataElement::Bit(el) => Ok(Value::Int(el.as_int()?)),
            DataElement::Array(el) => el.get_value(),
            DataElement::Struct(el) => el.get_value(),
        }
    }

    pub fn set_value(&self, value: &Value) -> Result<()> {
        match (self, value) {
            (DataElement::Int(el), Value::Int(v)) => el.set_int(*v),
            (DataElement::Bit(el), Value::Int(v)) => el.set_int(*v),
            (DataElement::Bcd(el), Value::Int(v)) => el.set_int(*v),
            (DataElement::Bcd(el), Value::Bcd(tens, units)) => {
                el.set_int((tens * 10 + units) as i64)
            }
            (DataElement::Char(el), Value::Char(c)) => el.set_char(*c),
            (DataElement::Char(el), Value::String(s)) if s.chars().count() == 1 => {
                el.set_char(s.chars().next().unwrap_or('\0'))
            }
            (DataElement::Char(el), Value::Int(v)) => {
                if !(0..=255).contains(v) {
                    return Err(BitwiseError::ValueRange(format!(
                        "char cannot hold {}",
                        v
                    )));
                }
                el.set_raw(&[*v as u8])
            }
            (DataElement::Array(el), v) => el.set_value(v),
            (DataElement::Struct(_), _) => Err(BitwiseError::Unsupported(
                "structs have no semantic setter; set individual fields or use set_raw",
            )),
            _ => Err(BitwiseError::Unsupported(
                "value type does not match element type",
            )),
        }
    }

    /// Integer interpretation: int and bitfield values, a char's byte,
    /// a BCD byte's two digits, or a whole BCD array
    pub fn as_int(&self) -> Result<i64> {
        match self {
            DataElement::Int(el) => el.as_int(),
            DataElement::Bit(el) => el.as_int(),
            DataElement::Bcd(el) => el.as_int(),
            DataElement::Char(el) => Ok(el.byte()? as i64),
            DataElement::Array(el) => {
                let value = el.as_int()?;
                i64::try_from(value).map_err(|_| {
                    BitwiseError::ValueRange(format!("BCD value {} does not fit in i64", value))
                })
            }
            DataElement::Struct(_) => {
                Err(BitwiseError::Unsupported("struct cannot coerce to int"))
            }
        }
    }

    pub fn set_int(&self, value: i64) -> Result<()> {
        match self {
            DataElement::Int(el) => el.set_int(value),
            DataElement::Bit(el) => el.set_int(value),
            DataElement::Bcd(el) => el.set_int(value),
            DataElement::Array(el) => {
                if value < 0 {
                    return Err(BitwiseError::ValueRange(format!(
                        "BCD array cannot hold negative value {}",
                        value
                    )));
                }
                el.set_int(value as u64)
            }
            _ => Err(BitwiseError::Unsupported("element has no integer setter")),
        }
    }

    /// String interpretation of a char or char array
    pub fn as_string(&self) -> Result<String> {
        match self {
            DataElement::Char(el) => Ok(el.as_char()?.to_string()),
            DataElement::Array(el) => el.as_string(),
            _ => Err(BitwiseError::Unsupported("element is not a string")),
        }
    }

    pub fn set_string(&self, s: &str) -> Result<()> {
        match self {
            DataElement::Array(el) => el.set_string(s),
            DataElement::Char(el) if s.chars().count() == 1 => {
                el.set_char(s.chars().next().unwrap_or('\0'))
            }
            _ => Err(BitwiseError::Unsupported("element is not a string")),
        }
    }

    pub fn get_raw(&self) -> Result<Vec<u8>> {
        match self {
            DataElement::Int(el) => el.get_raw(),
            DataElement::Char(el) => el.get_raw(),
            DataElement::Bcd(el) => el.get_raw(),
            DataElement::Bit(el) => el.get_raw(),
            DataElement::Array(el) => el.get_raw(),
            DataElement::Struct(el) => el.get_raw(),
        }
    }

    /// Every variant requires the exact byte length of its span
    pub fn set_raw(&self, data: &[u8]) -> Result<()> {
        match self {
            DataElement::Int(el) => el.set_raw(data),
            DataElement::Char(el) => el.set_raw(data),
            DataElement::Bcd(el) => el.set_raw(data),
            DataElement::Bit(el) => el.set_raw(data),
            DataElement::Array(el) => el.set_raw(data),
            DataElement::Struct(el) => el.set_raw(data),
        }
    }

    /// Fill the element's span with one repeated byte. A bitfield fills
    /// its whole backing integer.
    pub fn fill_raw(&self, byte: u8) -> Result<()> {
        let len = match self {
            DataElement::Bit(el) => el.backing_bytes(),
            other => other.size() / 8,
        };
        self.set_raw(&vec![byte; len])
    }

    pub fn as_struct(&self) -> Result<&StructElement> {
        match self {
            DataElement::Struct(el) => Ok(el),
            _ => Err(BitwiseError::Unsupported("element is not a struct")),
        }
    }

    pub fn as_array(&self) -> Result<&ArrayElement> {
        match self {
            DataElement::Array(el) => Ok(el),
            _ => Err(BitwiseError::Unsupported("element is not an array")),
        }
    }

    /// Retrieve a descendant by symbolic path, e.g. `.mystruct.foo[2].f1`
    pub fn get_path(&self, path: &str) -> Result<&DataElement> {
        if path.is_empty() {
            return Ok(self);
        }
        if let Some(rest) = path.strip_prefix('.') {
            return self.get_path(rest);
        }
        if let Some(rest) = path.strip_prefix('[') {
            let (index, rest) = rest
                .split_once(']')
                .ok_or_else(|| BitwiseError::Syntax(format!("bad element path `{}`", path)))?;
            let index: usize = index
                .trim()
                .parse()
                .map_err(|_| BitwiseError::Syntax(format!("bad array index `{}`", index)))?;
            let array = self.as_array()?;
            let item = array.get(index).ok_or(BitwiseError::Bounds {
                offset: index,
                len: 1,
                extent: array.len(),
            })?;
            return item.get_path(rest);
        }
        let end = path.find(['.', '[']).unwrap_or(path.len());
        let (name, rest) = path.split_at(end);
        self.as_struct()?.field(name)?.get_path(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitwise::parse_bytes;

    #[test]
    fn test_int_element_views_are_live() {
        let (root, mem) = parse_bytes("u8 foo;", &[0x12]).unwrap();
        let foo = root.field("foo").unwrap();
        assert_eq!(foo.as_int().unwrap(), 0x12);

        // mutate the backing store directly; the view must see it
        mem.borrow_mut().set_byte(0, 0x34).unwrap();
        assert_eq!(foo.as_int().unwrap(), 0x34);

        // and the other way around
        foo.set_int(0x56).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0x56]);
    }

    #[test]
    fn test_int_masking() {
        let (root, mem) = parse_bytes("u8 a; u16 b;", &[0, 0, 0]).unwrap();
        root.field("a").unwrap().set_int(0x1FF).unwrap();
        assert_eq!(mem.borrow().get(0, Some(1)).unwrap(), &[0xFF]);
        root.field("b").unwrap().set_int(0x1_0002).unwrap();
        assert_eq!(mem.borrow().get(1, Some(2)).unwrap(), &[0x00, 0x02]);
    }

    #[test]
    fn test_char_element() {
        let (root, mem) = parse_bytes("char foo;", b"c").unwrap();
        let foo = root.field("foo").unwrap();
        assert_eq!(foo.as_string().unwrap(), "c");
        assert_eq!(foo.size(), 8);
        foo.set_string("d").unwrap();
        assert_eq!(mem.borrow().get_packed(), b"d");

        assert!(foo.set_value(&Value::Char('\u{1F600}')).is_err());
    }

    #[test]
    fn test_bcd_element() {
        let (root, mem) = parse_bytes("bbcd foo;", &[0x42]).unwrap();
        let foo = root.field("foo").unwrap();
        assert_eq!(foo.as_int().unwrap(), 42);
        assert_eq!(foo.get_value().unwrap(), Value::Bcd(4, 2));

        foo.set_int(7).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0x07]);

        assert!(foo.set_int(100).is_err());
        assert!(foo.set_int(-1).is_err());
    }

    #[test]
    fn test_bcd_array_overflow() {
        // 20 digits of 9 exceeds u64
        let (root, _mem) = parse_bytes("bbcd n[10];", &[0x99; 10]).unwrap();
        let n = root.field("n").unwrap();
        assert!(matches!(n.as_int(), Err(BitwiseError::ValueRange(_))));

        // 9_999_999_999_999_999_999 fits u64 but not i64
        let mut data = vec![0x99; 10];
        data[0] = 0x09;
        let (root, _mem) = parse_bytes("bbcd n[10];", &data).unwrap();
        let n = root.field("n").unwrap();
        assert_eq!(
            n.as_array().unwrap().as_int().unwrap(),
            9_999_999_999_999_999_999
        );
        assert!(matches!(n.as_int(), Err(BitwiseError::ValueRange(_))));
    }

    #[test]
    fn test_bitfield_non_interference() {
        let (root, mem) = parse_bytes("u8 a:3, b:5;", &[0x00]).unwrap();
        let a = root.field("a").unwrap();
        let b = root.field("b").unwrap();

        b.set_int(0x15).unwrap();
        for v in 0..8 {
            a.set_int(v).unwrap();
            assert_eq!(a.as_int().unwrap(), v);
            assert_eq!(b.as_int().unwrap(), 0x15, "sibling clobbered at a={}", v);
        }
        assert_eq!(mem.borrow().get_packed(), &[0xF5]);
    }

    #[test]
    fn test_bitfield_value_masked_to_width() {
        let (root, mem) = parse_bytes("u8 a:4, b:4;", &[0x00]).unwrap();
        root.field("a").unwrap().set_int(0xFF).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0xF0]);
        assert_eq!(root.field("b").unwrap().as_int().unwrap(), 0);
    }

    #[test]
    fn test_array_cardinality() {
        let (root, _mem) = parse_bytes("u8 foo[5];", &[0; 5]).unwrap();
        let foo = root.field("foo").unwrap();

        let short = Value::List(vec![Value::Int(1); 4]);
        match foo.set_value(&short) {
            Err(BitwiseError::Cardinality {
                expected: 5,
                actual: 4,
            }) => {}
            other => panic!("expected cardinality error, got {:?}", other),
        }

        let exact = Value::List((1..=5).map(Value::Int).collect());
        foo.set_value(&exact).unwrap();
        let array = foo.as_array().unwrap();
        for i in 0..5 {
            assert_eq!(array.get(i).unwrap().as_int().unwrap(), i as i64 + 1);
        }
    }

    #[test]
    fn test_array_position() {
        let (root, _mem) = parse_bytes("u8 foo[4];", &[10, 20, 30, 20]).unwrap();
        let foo = root.field("foo").unwrap().as_array().unwrap();
        assert_eq!(foo.position(&Value::Int(20)).unwrap(), 1);
        assert!(matches!(
            foo.position(&Value::Int(99)),
            Err(BitwiseError::NotFound)
        ));
    }

    #[test]
    fn test_array_raw_round_trip() {
        let (root, _mem) = parse_bytes("u16 foo[2];", &[0; 4]).unwrap();
        let foo = root.field("foo").unwrap();
        foo.set_raw(&[0x00, 0x01, 0x00, 0x02]).unwrap();
        let array = foo.as_array().unwrap();
        assert_eq!(array.get(0).unwrap().as_int().unwrap(), 1);
        assert_eq!(array.get(1).unwrap().as_int().unwrap(), 2);

        assert!(foo.set_raw(&[0; 3]).is_err());
        assert!(foo.set_raw(&[0; 5]).is_err());
    }

    #[test]
    fn test_string_array() {
        let (root, mem) = parse_bytes("char foo[6];", b"foobar").unwrap();
        let foo = root.field("foo").unwrap();
        assert_eq!(foo.as_string().unwrap(), "foobar");
        assert_eq!(foo.size(), 48);

        foo.set_string("bazfoo").unwrap();
        assert_eq!(mem.borrow().get_packed(), b"bazfoo");

        assert!(foo.set_string("bazfo").is_err());
        assert!(foo.set_string("bazfooo").is_err());
    }

    #[test]
    fn test_struct_size_additivity() {
        let (root, _mem) =
            parse_bytes("struct { u8 a; u16 b; bbcd c[2]; char d[3]; } s;", &[0; 8]).unwrap();
        let s = root.field("s").unwrap().as_struct().unwrap();
        let sum: usize = s.items().map(|(_, el)| el.size()).sum();
        assert_eq!(s.size(), sum);
        assert_eq!(s.size(), 8 * 8);
    }

    #[test]
    fn test_struct_raw() {
        let (root, mem) = parse_bytes("struct { u8 a; u8 b; } s;", b"..").unwrap();
        let s = root.field("s").unwrap().as_struct().unwrap();
        assert_eq!(s.get_raw().unwrap(), b"..");

        s.set_raw(&[0x12, 0x34]).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0x12, 0x34]);
        assert_eq!(s.field("a").unwrap().as_int().unwrap(), 0x12);

        assert!(s.set_raw(&[0x00]).is_err());
    }

    #[test]
    fn test_fill_raw() {
        let (root, _mem) = parse_bytes("struct { u8 a; u16 b; } s;", &[0; 3]).unwrap();
        let s = root.field("s").unwrap();
        s.fill_raw(0xAA).unwrap();
        assert_eq!(s.get_path(".a").unwrap().as_int().unwrap(), 0xAA);
        assert_eq!(s.get_path(".b").unwrap().as_int().unwrap(), 0xAAAA);
    }

    #[test]
    fn test_get_path() {
        let defn = "struct { u8 a; struct { u8 b; } inner[2]; } top;";
        let (root, _mem) = parse_bytes(defn, &[1, 2, 3]).unwrap();
        assert_eq!(root.get_path("top.a").unwrap().as_int().unwrap(), 1);
        assert_eq!(
            root.get_path(".top.inner[1].b").unwrap().as_int().unwrap(),
            3
        );
        assert!(root.get_path("top.inner[5].b").is_err());
        assert!(root.get_path("top.nope").is_err());
        assert!(root.get_path("top.inner[x].b").is_err());
    }

    #[test]
    fn test_array_copy() {
        let (root, mem) = parse_bytes("u8 a[3]; u8 b[3]; u8 c[2];", &[1, 2, 3, 0, 0, 0, 0, 0])
            .unwrap();
        let a = root.field("a").unwrap().as_array().unwrap();
        let b = root.field("b").unwrap().as_array().unwrap();
        let c = root.field("c").unwrap().as_array().unwrap();

        array_copy(b, a).unwrap();
        assert_eq!(&mem.borrow().get_packed()[3..6], &[1, 2, 3]);

        assert!(matches!(
            array_copy(c, a),
            Err(BitwiseError::Cardinality {
                expected: 2,
                actual: 3,
            })
        ));
    }

    #[test]
    fn test_string_helpers() {
        let (root, _mem) = parse_bytes("char s[3];", b"abc").unwrap();
        let s = root.field("s").unwrap().as_array().unwrap();
        assert_eq!(get_string(s).unwrap(), "abc");
        set_string(s, "xyz").unwrap();
        assert_eq!(get_string(s).unwrap(), "xyz");
    }

    #[test]
    fn test_unknown_field() {
        let (root, _mem) = parse_bytes("u8 foo;", &[0]).unwrap();
        assert!(root.contains("foo"));
        assert!(!root.contains("bar"));
        match root.field("bar") {
            Err(BitwiseError::UnknownField { name, .. }) => assert_eq!(name, "bar"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_value_json_preserves_field_order() {
        let (root, _mem) =
            parse_bytes("struct { u8 zulu; u8 alpha; u8 mike; } s;", &[1, 2, 3]).unwrap();
        let json = serde_json::to_string(&root.get_value().unwrap()).unwrap();
        assert_eq!(json, r#"{"s":{"zulu":1,"alpha":2,"mike":3}}"#);
    }
}
