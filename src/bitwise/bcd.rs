// Packed binary-coded-decimal codec: two decimal digits per byte, high
// nibble first. Multi-byte quantities come in two digit orders, bbcd
// (first byte most significant) and lbcd (first byte least significant).

use super::elements::ArrayElement;
use super::types::Endianness;
use super::{BitwiseError, Result};

/// Split one BCD byte into its (tens, units) nibbles. No validation;
/// callers that care about non-decimal nibbles check themselves.
pub fn split_digits(byte: u8) -> (u8, u8) {
    ((byte & 0xF0) >> 4, byte & 0x0F)
}

/// Pack two decimal digits into one BCD byte
pub fn pack_digits(tens: u8, units: u8) -> Result<u8> {
    if tens > 9 || units > 9 {
        return Err(BitwiseError::ValueRange(format!(
            "({}, {}) is not a decimal digit pair",
            tens, units
        )));
    }
    Ok((tens << 4) | units)
}

/// Decode a run of BCD bytes into an integer, honoring digit order
pub fn bcd_bytes_to_int(bytes: &[u8], order: Endianness) -> u64 {
    let mut value: u64 = 0;
    let iter: Box<dyn Iterator<Item = &u8>> = match order {
        Endianness::Big => Box::new(bytes.iter()),
        Endianness::Little => Box::new(bytes.iter().rev()),
    };
    for byte in iter {
        let (tens, units) = split_digits(*byte);
        value = value * 100 + (tens * 10 + units) as u64;
    }
    value
}

/// Encode an integer as @len BCD bytes. Digits beyond the capacity of
/// @len bytes are dropped from the most-significant end, matching how a
/// fixed-width field truncates.
pub fn int_to_bcd_bytes(value: u64, len: usize, order: Endianness) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    let mut remaining = value;
    // fill least-significant byte first
    let indices: Box<dyn Iterator<Item = usize>> = match order {
        Endianness::Big => Box::new((0..len).rev()),
        Endianness::Little => Box::new(0..len),
    };
    for i in indices {
        let pair = remaining % 100;
        out[i] = pack_digits((pair / 10) as u8, (pair % 10) as u8)?;
        remaining /= 100;
    }
    Ok(out)
}

/// Read a whole BCD array as one integer
pub fn bcd_to_int(array: &ArrayElement) -> Result<u64> {
    array.as_int()
}

/// Write @value across a whole BCD array
pub fn int_to_bcd(array: &ArrayElement, value: u64) -> Result<()> {
    array.set_int(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_pairs() {
        assert_eq!(split_digits(0x42), (4, 2));
        assert_eq!(split_digits(0x09), (0, 9));
        assert_eq!(split_digits(0xFA), (0xF, 0xA));

        assert_eq!(pack_digits(4, 2).unwrap(), 0x42);
        assert_eq!(pack_digits(0, 0).unwrap(), 0x00);
        assert!(pack_digits(10, 0).is_err());
        assert!(pack_digits(0, 12).is_err());
    }

    #[test]
    fn test_bcd_bytes_to_int() {
        assert_eq!(bcd_bytes_to_int(&[0x12, 0x34], Endianness::Big), 1234);
        assert_eq!(bcd_bytes_to_int(&[0x12, 0x34], Endianness::Little), 3412);
        assert_eq!(bcd_bytes_to_int(&[0x07], Endianness::Big), 7);
        assert_eq!(bcd_bytes_to_int(&[], Endianness::Big), 0);
    }

    #[test]
    fn test_int_to_bcd_bytes() {
        assert_eq!(
            int_to_bcd_bytes(1234, 2, Endianness::Big).unwrap(),
            vec![0x12, 0x34]
        );
        assert_eq!(
            int_to_bcd_bytes(1234, 2, Endianness::Little).unwrap(),
            vec![0x34, 0x12]
        );
        assert_eq!(
            int_to_bcd_bytes(7, 2, Endianness::Big).unwrap(),
            vec![0x00, 0x07]
        );
        // overflow drops the most-significant digits
        assert_eq!(
            int_to_bcd_bytes(12345, 2, Endianness::Big).unwrap(),
            vec![0x23, 0x45]
        );
    }

    #[test]
    fn test_byte_round_trip() {
        for value in [0u64, 1, 99, 100, 9999, 123456] {
            for order in [Endianness::Big, Endianness::Little] {
                let bytes = int_to_bcd_bytes(value, 3, order).unwrap();
                assert_eq!(bcd_bytes_to_int(&bytes, order), value % 1_000_000);
            }
        }
    }

    #[test]
    fn test_element_round_trip() {
        let (root, mem) = crate::bitwise::parse_bytes("bbcd n[4];", &[0; 4]).unwrap();
        let n = root.field("n").unwrap().as_array().unwrap();
        int_to_bcd(n, 1234).unwrap();
        assert_eq!(mem.borrow().get_packed(), &[0x00, 0x00, 0x12, 0x34]);
        assert_eq!(bcd_to_int(n).unwrap(), 1234);
    }

    #[test]
    fn test_bbcd_lbcd_byte_reversal() {
        let (big, bmem) = crate::bitwise::parse_bytes("bbcd n[2];", &[0; 2]).unwrap();
        let (little, lmem) = crate::bitwise::parse_bytes("lbcd n[2];", &[0; 2]).unwrap();
        int_to_bcd(big.field("n").unwrap().as_array().unwrap(), 1234).unwrap();
        int_to_bcd(little.field("n").unwrap().as_array().unwrap(), 1234).unwrap();
        let b = bmem.borrow().to_vec();
        let mut l = lmem.borrow().to_vec();
        l.reverse();
        assert_eq!(b, l);
    }
}
