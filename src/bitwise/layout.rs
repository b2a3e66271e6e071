// Layout engine: walks the parsed AST left-to-right with a byte cursor,
// constructing data element views over the shared memory map. All offset
// arithmetic lives here; the element views never move once built.

use super::elements::{
    ArrayElement, BcdElement, BitElement, CharElement, DataElement, IntElement, StructElement,
};
use super::grammar::{BitDef, Decl, Directive, StructBody};
use super::types::ScalarType;
use super::{BitwiseError, MemRef, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Walks a definition AST and lays out element views over a memory map.
/// The cursor only ever moves when a declaration consumes space; named
/// struct definitions and directives reposition without consuming.
pub struct Processor {
    mem: MemRef,
    offset: usize,
    user_types: HashMap<String, Vec<Decl>>,
}

impl Processor {
    pub fn new(mem: &MemRef, offset: usize) -> Self {
        Self {
            mem: MemRef::clone(mem),
            offset,
            user_types: HashMap::new(),
        }
    }

    /// Current byte cursor
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Lay out @decls starting at the construction offset and return the
    /// root struct holding every top-level field.
    pub fn run(&mut self, decls: &[Decl]) -> Result<StructElement> {
        let mut root = StructElement::new(&self.mem, self.offset, "(root)");
        self.process_block(&mut root, decls)?;
        Ok(root)
    }

    fn process_block(&mut self, parent: &mut StructElement, decls: &[Decl]) -> Result<()> {
        for decl in decls {
            self.process_decl(parent, decl)?;
        }
        Ok(())
    }

    fn process_decl(&mut self, parent: &mut StructElement, decl: &Decl) -> Result<()> {
        match decl {
            Decl::Scalar { dtype, name, count } => match (dtype, count) {
                (ScalarType::Bit | ScalarType::Lbit, Some(n)) => {
                    let element = self.lay_bit_array(*dtype, *n)?;
                    self.add_field(parent, name, element);
                    Ok(())
                }
                (ScalarType::Bit | ScalarType::Lbit, None) => Err(BitwiseError::Syntax(format!(
                    "`{}` requires an array count: `{} {}[8];`",
                    dtype.keyword(),
                    dtype.keyword(),
                    name
                ))),
                (_, None) => {
                    let element = self.lay_scalar(*dtype)?;
                    self.add_field(parent, name, element);
                    Ok(())
                }
                (_, Some(n)) => {
                    let start = self.offset;
                    let mut items = Vec::with_capacity(*n);
                    for _ in 0..*n {
                        items.push(self.lay_scalar(*dtype)?);
                    }
                    let element =
                        DataElement::Array(ArrayElement::new(&self.mem, start, items));
                    self.add_field(parent, name, element);
                    Ok(())
                }
            },
            Decl::Bitfield { dtype, fields } => self.lay_bitfield(parent, *dtype, fields),
            Decl::StructDef { name, body } => {
                if self.user_types.insert(name.clone(), body.clone()).is_some() {
                    warn!("struct type `{}` redefined", name);
                }
                Ok(())
            }
            Decl::StructUse { body, name, count } => {
                let decls = self.resolve_body(body)?;
                let element = self.lay_repeated(name, *count, |p, field_name| {
                    let mut inner = StructElement::new(&p.mem, p.offset, field_name);
                    p.process_block(&mut inner, &decls)?;
                    Ok(DataElement::Struct(inner))
                })?;
                self.add_field(parent, name, element);
                Ok(())
            }
            Decl::Union { body, name, count } => {
                let element = self.lay_repeated(name, *count, |p, field_name| {
                    p.lay_union(field_name, body)
                })?;
                self.add_field(parent, name, element);
                Ok(())
            }
            Decl::Directive(directive) => self.process_directive(directive),
        }
    }

    /// Lay one instance, or an array of them when @count is given. Each
    /// repetition starts where the previous one finished.
    fn lay_repeated<F>(&mut self, name: &str, count: Option<usize>, mut lay: F) -> Result<DataElement>
    where
        F: FnMut(&mut Self, &str) -> Result<DataElement>,
    {
        match count {
            None => lay(self, name),
            Some(n) => {
                let start = self.offset;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(lay(self, name)?);
                }
                Ok(DataElement::Array(ArrayElement::new(&self.mem, start, items)))
            }
        }
    }

    fn resolve_body(&self, body: &StructBody) -> Result<Vec<Decl>> {
        match body {
            StructBody::Inline(decls) => Ok(decls.clone()),
            StructBody::Named(type_name) => self
                .user_types
                .get(type_name)
                .cloned()
                .ok_or_else(|| {
                    BitwiseError::Syntax(format!("undefined struct type `{}`", type_name))
                }),
        }
    }

    fn lay_scalar(&mut self, dtype: ScalarType) -> Result<DataElement> {
        let element = match dtype {
            ScalarType::Char => DataElement::Char(CharElement::new(&self.mem, self.offset)?),
            ScalarType::Lbcd | ScalarType::Bbcd => DataElement::Bcd(BcdElement::new(
                &self.mem,
                self.offset,
                dtype.endianness(),
            )?),
            _ => DataElement::Int(IntElement::new(&self.mem, self.offset, dtype)?),
        };
        self.offset += dtype.size_bytes();
        Ok(element)
    }

    /// `bit foo[N]`: N logical 1-bit views packed 8 per byte. `bit` fills
    /// each byte high-bit-first, `lbit` low-bit-first. The count must be a
    /// whole number of bytes so the cursor stays byte-aligned.
    fn lay_bit_array(&mut self, dtype: ScalarType, count: usize) -> Result<DataElement> {
        if count % 8 != 0 {
            return Err(BitwiseError::Syntax(format!(
                "`{}` array length {} is not a multiple of 8",
                dtype.keyword(),
                count
            )));
        }
        let start = self.offset;
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let shift = match dtype {
                ScalarType::Lbit => (i % 8) + 1,
                _ => 8 - (i % 8),
            };
            items.push(DataElement::Bit(BitElement::new(
                &self.mem,
                start + i / 8,
                1,
                shift,
                ScalarType::U8,
            )?));
        }
        self.offset = start + count / 8;
        Ok(DataElement::Array(ArrayElement::new(&self.mem, start, items)))
    }

    /// `u16 a:4, b:8, c:4;`: named sub-fields of one backing integer,
    /// allocated most-significant-first. Declaring more bits than the
    /// backing type holds is an error; declaring fewer leaves the trailing
    /// bits unnamed but still consumes the full backing width.
    fn lay_bitfield(
        &mut self,
        parent: &mut StructElement,
        dtype: ScalarType,
        fields: &[BitDef],
    ) -> Result<()> {
        if !dtype.is_int() {
            return Err(BitwiseError::Syntax(format!(
                "`{}` cannot back a bitfield",
                dtype.keyword()
            )));
        }
        let total = dtype.size_bytes() * 8;
        let mut shift = total;
        for field in fields {
            if field.bits == 0 || field.bits > shift {
                return Err(BitwiseError::Syntax(format!(
                    "bitfield `{}:{}` does not fit in {} remaining bits of {}",
                    field.name,
                    field.bits,
                    shift,
                    dtype.keyword()
                )));
            }
            let element = DataElement::Bit(BitElement::new(
                &self.mem,
                self.offset,
                field.bits,
                shift,
                dtype,
            )?);
            self.add_field(parent, &field.name, element);
            shift -= field.bits;
        }
        if shift != 0 {
            warn!(
                "bitfield over {} leaves {} trailing bits unnamed",
                dtype.keyword(),
                shift
            );
        }
        self.offset += dtype.size_bytes();
        Ok(())
    }

    /// `union { ... } name;`: every member is laid out from the same start
    /// offset and all members must consume the same number of bytes. The
    /// members share one flat namespace on the resulting struct.
    fn lay_union(&mut self, name: &str, body: &[Decl]) -> Result<DataElement> {
        let start = self.offset;
        let mut element = StructElement::new(&self.mem, start, name);
        let mut member_size: Option<usize> = None;
        for decl in body {
            self.offset = start;
            self.process_decl(&mut element, decl)?;
            let consumed = self.offset - start;
            match member_size {
                None => member_size = Some(consumed),
                Some(expected) if expected != consumed => {
                    return Err(BitwiseError::Syntax(format!(
                        "union `{}` members disagree on size: {} vs {} bytes",
                        name, expected, consumed
                    )));
                }
                Some(_) => {}
            }
        }
        let size = member_size.unwrap_or(0);
        element.set_union_bits(size * 8);
        self.offset = start + size;
        Ok(DataElement::Struct(element))
    }

    fn process_directive(&mut self, directive: &Directive) -> Result<()> {
        match directive {
            Directive::SeekTo(pos) => {
                if *pos < self.offset {
                    warn!(
                        "seekto {:#x} moves backward from {:#x}; following fields \
                         alias earlier ones",
                        pos, self.offset
                    );
                }
                self.offset = *pos;
                Ok(())
            }
            Directive::Seek(delta) => {
                let target = self.offset as i64 + delta;
                if target < 0 {
                    return Err(BitwiseError::Syntax(format!(
                        "seek {} from offset {:#x} lands before the map",
                        delta, self.offset
                    )));
                }
                self.offset = target as usize;
                Ok(())
            }
            Directive::PrintOffset(label) => {
                debug!("{} is at offset {:#x}", label, self.offset);
                Ok(())
            }
        }
    }

    /// Attach @element to @parent. A repeated name gets an offset-derived
    /// alias instead of shadowing the earlier field.
    fn add_field(&mut self, parent: &mut StructElement, name: &str, element: DataElement) {
        if parent.contains(name) {
            let alias = format!("{}_{:06x}", name, element.offset());
            warn!(
                "duplicate field `{}` in `{}`, renamed to `{}`",
                name,
                parent.name(),
                alias
            );
            parent.push_field(&alias, element);
        } else {
            parent.push_field(name, element);
        }
    }
}
