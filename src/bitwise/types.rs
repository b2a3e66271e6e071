// Scalar type catalog for the structure definition language, plus the
// fixed-width integer byte codec shared by the element views.

use serde::{Deserialize, Serialize};

/// Endianness for multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    pub fn is_big(&self) -> bool {
        matches!(self, Endianness::Big)
    }

    pub fn is_little(&self) -> bool {
        matches!(self, Endianness::Little)
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Big
    }
}

/// The closed set of scalar type keywords the grammar accepts.
///
/// `Bit`/`Lbit` are only legal as arrays (8 logical bits per backing byte);
/// everything else is a byte-aligned scalar. The `l` prefix on integer
/// types and `lbcd` selects little-endian byte (or BCD digit) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bit,
    Lbit,
    U8,
    U16,
    Ul16,
    U24,
    Ul24,
    U32,
    Ul32,
    I8,
    I16,
    Il16,
    I24,
    Il24,
    I32,
    Il32,
    Char,
    Lbcd,
    Bbcd,
}

impl ScalarType {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let t = match word {
            "bit" => ScalarType::Bit,
            "lbit" => ScalarType::Lbit,
            "u8" => ScalarType::U8,
            "u16" => ScalarType::U16,
            "ul16" => ScalarType::Ul16,
            "u24" => ScalarType::U24,
            "ul24" => ScalarType::Ul24,
            "u32" => ScalarType::U32,
            "ul32" => ScalarType::Ul32,
            "i8" => ScalarType::I8,
            "i16" => ScalarType::I16,
            "il16" => ScalarType::Il16,
            "i24" => ScalarType::I24,
            "il24" => ScalarType::Il24,
            "i32" => ScalarType::I32,
            "il32" => ScalarType::Il32,
            "char" => ScalarType::Char,
            "lbcd" => ScalarType::Lbcd,
            "bbcd" => ScalarType::Bbcd,
            _ => return None,
        };
        Some(t)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ScalarType::Bit => "bit",
            ScalarType::Lbit => "lbit",
            ScalarType::U8 => "u8",
            ScalarType::U16 => "u16",
            ScalarType::Ul16 => "ul16",
            ScalarType::U24 => "u24",
            ScalarType::Ul24 => "ul24",
            ScalarType::U32 => "u32",
            ScalarType::Ul32 => "ul32",
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::Il16 => "il16",
            ScalarType::I24 => "i24",
            ScalarType::Il24 => "il24",
            ScalarType::I32 => "i32",
            ScalarType::Il32 => "il32",
            ScalarType::Char => "char",
            ScalarType::Lbcd => "lbcd",
            ScalarType::Bbcd => "bbcd",
        }
    }

    /// Backing byte width of one scalar of this type. `bit`/`lbit` report
    /// the single byte that backs each group of 8.
    pub fn size_bytes(&self) -> usize {
        match self {
            ScalarType::Bit
            | ScalarType::Lbit
            | ScalarType::U8
            | ScalarType::I8
            | ScalarType::Char
            | ScalarType::Lbcd
            | ScalarType::Bbcd => 1,
            ScalarType::U16 | ScalarType::Ul16 | ScalarType::I16 | ScalarType::Il16 => 2,
            ScalarType::U24 | ScalarType::Ul24 | ScalarType::I24 | ScalarType::Il24 => 3,
            ScalarType::U32 | ScalarType::Ul32 | ScalarType::I32 | ScalarType::Il32 => 4,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ScalarType::I8
                | ScalarType::I16
                | ScalarType::Il16
                | ScalarType::I24
                | ScalarType::Il24
                | ScalarType::I32
                | ScalarType::Il32
        )
    }

    /// Byte order for integers, digit order for BCD, bit order for bits
    pub fn endianness(&self) -> Endianness {
        match self {
            ScalarType::Lbit
            | ScalarType::Ul16
            | ScalarType::Ul24
            | ScalarType::Ul32
            | ScalarType::Il16
            | ScalarType::Il24
            | ScalarType::Il32
            | ScalarType::Lbcd => Endianness::Little,
            _ => Endianness::Big,
        }
    }

    pub fn is_int(&self) -> bool {
        !matches!(
            self,
            ScalarType::Bit
                | ScalarType::Lbit
                | ScalarType::Char
                | ScalarType::Lbcd
                | ScalarType::Bbcd
        )
    }

    pub fn is_bcd(&self) -> bool {
        matches!(self, ScalarType::Lbcd | ScalarType::Bbcd)
    }
}

/// Decode 1-4 bytes as a fixed-width integer. 24-bit values are padded
/// with a zero byte on the appropriate end and decoded as 32-bit; signed
/// values are sign-extended from the declared width.
pub fn decode_int(data: &[u8], signed: bool, endian: Endianness) -> i64 {
    let width = data.len();
    debug_assert!((1..=4).contains(&width));

    let mut buf = [0u8; 4];
    let raw = match endian {
        Endianness::Big => {
            buf[4 - width..].copy_from_slice(data);
            u32::from_be_bytes(buf)
        }
        Endianness::Little => {
            buf[..width].copy_from_slice(data);
            u32::from_le_bytes(buf)
        }
    };

    if signed {
        let shift = 32 - width as u32 * 8;
        (((raw << shift) as i32) >> shift) as i64
    } else {
        raw as i64
    }
}

/// Encode an integer as exactly @width bytes, masking to the type's bit
/// width (an 8-bit encode of 0x1FF stores 0xFF, matching C truncation).
pub fn encode_int(value: i64, width: usize, endian: Endianness) -> Vec<u8> {
    debug_assert!((1..=4).contains(&width));

    let mask: u64 = if width == 4 {
        u32::MAX as u64
    } else {
        (1u64 << (width * 8)) - 1
    };
    let masked = (value as u64 & mask) as u32;

    match endian {
        Endianness::Big => masked.to_be_bytes()[4 - width..].to_vec(),
        Endianness::Little => masked.to_le_bytes()[..width].to_vec(),
    }
}
