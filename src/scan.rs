//! Prefix scanners for numeric literals inside a raw line.
//!
//! Each scanner skips leading whitespace, consumes the longest valid
//! literal and returns the value with the number of bytes consumed.
//! `None` means no literal starts at the given position.

fn skip_whitespace(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| **b == b' ' || **b == b'\t').count()
}

fn count_digits(bytes: &[u8], radix: u32) -> usize {
    bytes.iter().take_while(|b| (**b as char).is_digit(radix)).count()
}

pub fn scan_float(bytes: &[u8]) -> Option<(f64, usize)> {
    let start = skip_whitespace(bytes);
    let mut len = start;
    if matches!(bytes.get(len), Some(b'+') | Some(b'-')) {
        len += 1;
    }

    let int_digits = count_digits(&bytes[len..], 10);
    len += int_digits;
    let mut frac_digits = 0;
    if bytes.get(len) == Some(&b'.') {
        frac_digits = count_digits(&bytes[len + 1..], 10);
        len += 1 + frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return None;
    }

    // Exponent only counts when at least one digit follows it.
    if matches!(bytes.get(len), Some(b'e') | Some(b'E')) {
        let mut exp = len + 1;
        if matches!(bytes.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        let exp_digits = count_digits(&bytes[exp.min(bytes.len())..], 10);
        if exp_digits > 0 {
            len = exp + exp_digits;
        }
    }

    let text = std::str::from_utf8(&bytes[start..len]).ok()?;
    text.parse::<f64>().ok().map(|v| (v, len))
}

pub fn scan_int(bytes: &[u8]) -> Option<(i32, usize)> {
    let start = skip_whitespace(bytes);
    let mut len = start;
    let negative = match bytes.get(len) {
        Some(b'-') => {
            len += 1;
            true
        }
        Some(b'+') => {
            len += 1;
            false
        }
        _ => false,
    };

    let digits = count_digits(&bytes[len..], 10);
    if digits == 0 {
        return None;
    }
    let mut value: i64 = 0;
    for &b in &bytes[len..len + digits] {
        value = value.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
        if value > i64::from(i32::MAX) + 1 {
            return None;
        }
    }
    let value = if negative { -value } else { value };
    let value = i32::try_from(value).ok()?;
    Some((value, len + digits))
}

pub fn scan_uint(bytes: &[u8], radix: u32) -> Option<(u32, usize)> {
    let start = skip_whitespace(bytes);
    let mut len = start;
    if bytes.get(len) == Some(&b'+') {
        len += 1;
    }

    let digits = count_digits(&bytes[len..], radix);
    if digits == 0 {
        return None;
    }
    let mut value: u32 = 0;
    for &b in &bytes[len..len + digits] {
        let d = (b as char).to_digit(radix)?;
        value = value.checked_mul(radix)?.checked_add(d)?;
    }
    Some((value, len + digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_accepts_sign_fraction_and_exponent() {
        assert_eq!(scan_float(b"10 Y20"), Some((10.0, 2)));
        assert_eq!(scan_float(b" -1.5"), Some((-1.5, 5)));
        assert_eq!(scan_float(b".25:1"), Some((0.25, 3)));
        assert_eq!(scan_float(b"2e3"), Some((2000.0, 3)));
        assert_eq!(scan_float(b"1.5E-1 "), Some((0.15, 6)));
    }

    #[test]
    fn float_leaves_dangling_exponent_alone() {
        // "E" here is the next parameter, not an exponent
        assert_eq!(scan_float(b"3E"), Some((3.0, 1)));
        assert_eq!(scan_float(b"3Ex"), Some((3.0, 1)));
    }

    #[test]
    fn float_rejects_missing_digits() {
        assert_eq!(scan_float(b""), None);
        assert_eq!(scan_float(b"-"), None);
        assert_eq!(scan_float(b"."), None);
        assert_eq!(scan_float(b"abc"), None);
    }

    #[test]
    fn int_handles_range_limits() {
        assert_eq!(scan_int(b"-2147483648"), Some((i32::MIN, 11)));
        assert_eq!(scan_int(b"2147483647"), Some((i32::MAX, 10)));
        assert_eq!(scan_int(b"2147483648"), None);
        assert_eq!(scan_int(b"+7x"), Some((7, 2)));
    }

    #[test]
    fn uint_supports_hex_groups() {
        assert_eq!(scan_uint(b"fe:01", 16), Some((0xfe, 2)));
        assert_eq!(scan_uint(b"4294967295", 10), Some((u32::MAX, 10)));
        assert_eq!(scan_uint(b"4294967296", 10), None);
        assert_eq!(scan_uint(b"-1", 10), None);
    }
}
