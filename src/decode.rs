//! Command decoding and typed parameter getters for a ready line.
//!
//! `seen` positions a read cursor just past a parameter letter; each getter
//! consumes that cursor, so a getter is only valid right after a successful
//! `seen`. A getter that fails leaves the caller's output untouched.

use crate::config::LIST_SEPARATOR;
use crate::error::{GCodeError, Result};
use crate::gcode_buffer::{Command, GCodeBuffer};
use crate::scan::{scan_float, scan_int, scan_uint};

/// M-codes whose parameter is free text, so a `G`/`M` inside it does not
/// start another command on the same line.
const FREE_TEXT_MCODES: [i32; 7] = [23, 28, 30, 32, 36, 117, 118];

/// Numeric type that can appear in a `:`-separated list.
pub trait ArrayElement: Copy {
    fn scan(bytes: &[u8]) -> Option<(Self, usize)>;
}

impl ArrayElement for f64 {
    fn scan(bytes: &[u8]) -> Option<(Self, usize)> {
        scan_float(bytes)
    }
}

impl ArrayElement for i32 {
    fn scan(bytes: &[u8]) -> Option<(Self, usize)> {
        scan_int(bytes)
    }
}

impl ArrayElement for u32 {
    fn scan(bytes: &[u8]) -> Option<(Self, usize)> {
        scan_uint(bytes, 10)
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b';')
}

/// Parse `N` byte-sized groups separated by any of `separators`.
fn parse_groups<const N: usize>(bytes: &[u8], radix: u32, separators: &[u8]) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    let mut p = 0;
    for (i, slot) in out.iter_mut().enumerate() {
        if !bytes.get(p).is_some_and(|b| (*b as char).is_digit(radix)) {
            return None;
        }
        let (value, len) = scan_uint(&bytes[p..], radix)?;
        *slot = u8::try_from(value).ok()?;
        p += len;
        if i + 1 < N {
            if !bytes.get(p).is_some_and(|b| separators.contains(b)) {
                return None;
            }
            p += 1;
        }
    }
    // a fifth quad or a seventh group is an error, not something to ignore
    match bytes.get(p) {
        Some(b) if separators.contains(b) || (*b as char).is_digit(radix) => None,
        _ => Some(out),
    }
}

impl GCodeBuffer {
    /// Find the command at `command_start` and where its parameters end.
    pub(crate) fn decode_command(&mut self) {
        self.read_pointer = None;
        let len = self.buffer.len();
        let Some(start) = (self.command_start..len).find(|&i| self.buffer[i].is_ascii_alphabetic()) else {
            self.command = None;
            self.parameter_start = len;
            self.command_end = len;
            return;
        };
        let buf = &self.buffer[..];
        let letter = buf[start].to_ascii_uppercase();
        let mut p = start + 1;

        let negative = buf.get(p) == Some(&b'-');
        let digits_at = if negative { p + 1 } else { p };
        let digits = buf[digits_at.min(len)..].iter().take_while(|b| b.is_ascii_digit()).count();
        let mut number = None;
        let mut fraction = None;
        if digits > 0 {
            let n = buf[digits_at..digits_at + digits]
                .iter()
                .fold(0i32, |acc, b| acc.saturating_mul(10).saturating_add(i32::from(b - b'0')));
            number = Some(if negative { -n } else { n });
            p = digits_at + digits;
            if buf.get(p) == Some(&b'.') {
                p += 1;
                if let Some(d) = buf.get(p).filter(|b| b.is_ascii_digit()) {
                    fraction = Some(d - b'0');
                }
                p += buf[p..].iter().take_while(|b| b.is_ascii_digit()).count();
            }
        }

        // A G or M after whitespace and outside quotes starts the next command.
        let splits = matches!(letter, b'G' | b'M' | b'T')
            && !(letter == b'M' && number.is_some_and(|n| FREE_TEXT_MCODES.contains(&n)));
        let mut end = len;
        if splits {
            let mut in_quotes = false;
            let mut primed = false;
            for (i, &c) in buf.iter().enumerate().skip(p) {
                if c == b'"' {
                    in_quotes = !in_quotes;
                    primed = false;
                } else if !in_quotes {
                    if primed && matches!(c.to_ascii_uppercase(), b'G' | b'M') {
                        end = i;
                        break;
                    }
                    primed = c == b' ' || c == b'\t';
                }
            }
        }

        self.command_start = start;
        self.parameter_start = p;
        self.command_end = end;
        self.command = Some(Command { letter: letter as char, number, fraction });
    }

    pub fn command(&self) -> Option<Command> {
        self.command
    }

    pub fn command_letter(&self) -> Option<char> {
        self.command.map(|c| c.letter)
    }

    pub fn has_command_number(&self) -> bool {
        self.command_number().is_some()
    }

    pub fn command_number(&self) -> Option<i32> {
        self.command.and_then(|c| c.number)
    }

    pub fn command_fraction(&self) -> Option<u8> {
        self.command.and_then(|c| c.fraction)
    }

    /// Look for parameter `letter` in the current command. Case-sensitive.
    pub fn seen(&mut self, letter: char) -> bool {
        self.read_pointer = None;
        if !letter.is_ascii() {
            return false;
        }
        let key = letter as u8;
        let buf = &self.buffer[..];
        let mut in_quotes = false;
        for i in self.parameter_start..self.command_end {
            let b = buf[i];
            if b == b'"' {
                in_quotes = !in_quotes;
            } else if !in_quotes && b == key {
                // E right after a digit is an exponent
                if key == b'E' && i > self.parameter_start && buf[i - 1].is_ascii_digit() {
                    continue;
                }
                self.read_pointer = Some(i + 1);
                return true;
            }
        }
        false
    }

    fn take_cursor(&mut self) -> Result<usize> {
        self.read_pointer.take().ok_or(GCodeError::NoParameter)
    }

    fn param_bytes(&self, from: usize) -> &[u8] {
        &self.buffer[from.min(self.command_end)..self.command_end]
    }

    pub fn get_f_value(&mut self) -> Result<f64> {
        let p = self.take_cursor()?;
        scan_float(self.param_bytes(p))
            .map(|(v, _)| v)
            .ok_or(GCodeError::MalformedParameter("expected a number"))
    }

    pub fn get_i_value(&mut self) -> Result<i32> {
        let p = self.take_cursor()?;
        scan_int(self.param_bytes(p))
            .map(|(v, _)| v)
            .ok_or(GCodeError::MalformedParameter("expected an integer"))
    }

    pub fn get_ui_value(&mut self) -> Result<u32> {
        let p = self.take_cursor()?;
        scan_uint(self.param_bytes(p), 10)
            .map(|(v, _)| v)
            .ok_or(GCodeError::MalformedParameter("expected a non-negative integer"))
    }

    /// Quoted string starting at `p`, with `""` unescaped.
    fn quoted_string_at(&self, p: usize) -> Result<String> {
        let bytes = self.param_bytes(p);
        if bytes.first() != Some(&b'"') {
            return Err(GCodeError::MalformedParameter("expected a quoted string"));
        }
        let mut out = Vec::new();
        let mut i = 1;
        loop {
            match bytes.get(i) {
                None => return Err(GCodeError::MalformedParameter("unterminated string")),
                Some(b'"') if bytes.get(i + 1) == Some(&b'"') => {
                    out.push(b'"');
                    i += 2;
                }
                Some(b'"') => break,
                Some(&c) => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    pub fn get_quoted_string(&mut self, allow_empty: bool) -> Result<String> {
        let p = self.take_cursor()?;
        let s = self.quoted_string_at(p)?;
        if s.is_empty() && !allow_empty {
            return Err(GCodeError::MalformedParameter("empty string"));
        }
        Ok(s)
    }

    /// Quoted string, or an unquoted run up to the next delimiter.
    pub fn get_possibly_quoted_string(&mut self, allow_empty: bool) -> Result<String> {
        let p = self.take_cursor()?;
        let s = if self.param_bytes(p).first() == Some(&b'"') {
            self.quoted_string_at(p)?
        } else {
            let run: Vec<u8> = self.param_bytes(p).iter().copied().take_while(|b| !is_delimiter(*b)).collect();
            String::from_utf8_lossy(&run).into_owned()
        };
        if s.is_empty() && !allow_empty {
            return Err(GCodeError::MalformedParameter("empty string"));
        }
        Ok(s)
    }

    /// Everything after the command, for free-text commands like `M117`.
    pub fn get_unprecedented_string(&mut self) -> Result<String> {
        self.read_pointer = None;
        let text = self.param_bytes(self.parameter_start).trim_ascii();
        if text.is_empty() {
            return Err(GCodeError::MalformedParameter("expected text"));
        }
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    /// Read a `:`-separated list into `out`, at most `out.len()` values.
    ///
    /// Returns how many slots were written. With `pad`, a short list is
    /// filled up with its last value and the full length is returned;
    /// without it, slots past the parsed values are left alone.
    pub fn get_array<T: ArrayElement>(&mut self, out: &mut [T], pad: bool) -> Result<usize> {
        let mut p = self.take_cursor()?;
        let mut values = Vec::with_capacity(out.len());
        loop {
            let Some((v, len)) = T::scan(self.param_bytes(p)) else {
                return Err(GCodeError::MalformedParameter("expected a number in list"));
            };
            if values.len() == out.len() {
                return Err(GCodeError::TooManyValues { max: out.len() });
            }
            values.push(v);
            p += len;
            if self.param_bytes(p).first() == Some(&LIST_SEPARATOR) {
                p += 1;
            } else {
                break;
            }
        }

        let count = values.len();
        out[..count].copy_from_slice(&values);
        if pad && count < out.len() {
            let last = values[count - 1];
            out[count..].fill(last);
            return Ok(out.len());
        }
        Ok(count)
    }

    pub fn get_float_array(&mut self, out: &mut [f64], pad: bool) -> Result<usize> {
        self.get_array(out, pad)
    }

    pub fn get_int_array(&mut self, out: &mut [i32], pad: bool) -> Result<usize> {
        self.get_array(out, pad)
    }

    pub fn get_unsigned_array(&mut self, out: &mut [u32], pad: bool) -> Result<usize> {
        self.get_array(out, pad)
    }

    pub fn get_ip_address(&mut self) -> Result<[u8; 4]> {
        let p = self.take_cursor()?;
        parse_groups::<4>(self.param_bytes(p), 10, b".")
            .ok_or(GCodeError::MalformedParameter("invalid IP address"))
    }

    /// IP address packed with the first quad in the low byte.
    pub fn get_ip_address_u32(&mut self) -> Result<u32> {
        self.get_ip_address().map(u32::from_le_bytes)
    }

    pub fn get_mac_address(&mut self) -> Result<[u8; 6]> {
        let p = self.take_cursor()?;
        parse_groups::<6>(self.param_bytes(p), 16, b":-")
            .ok_or(GCodeError::MalformedParameter("invalid MAC address"))
    }

    // --- TRY-GET VARIANTS ---
    //
    // `seen` is only ever set to true, so one flag can collect presence
    // over several parameters.

    pub fn try_get_f_value(&mut self, letter: char, val: &mut f64, seen: &mut bool) -> Result<()> {
        if self.seen(letter) {
            *val = self.get_f_value()?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_i_value(&mut self, letter: char, val: &mut i32, seen: &mut bool) -> Result<()> {
        if self.seen(letter) {
            *val = self.get_i_value()?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_ui_value(&mut self, letter: char, val: &mut u32, seen: &mut bool) -> Result<()> {
        if self.seen(letter) {
            *val = self.get_ui_value()?;
            *seen = true;
        }
        Ok(())
    }

    /// Like [`GCodeBuffer::get_array`] but the list must fill `vals`
    /// exactly (after padding, if requested).
    pub fn try_get_array<T: ArrayElement>(
        &mut self,
        letter: char,
        vals: &mut [T],
        seen: &mut bool,
        pad: bool,
    ) -> Result<()> {
        if !self.seen(letter) {
            return Ok(());
        }
        let mut scratch = vals.to_vec();
        let got = self.get_array(&mut scratch, pad)?;
        if got != vals.len() {
            return Err(GCodeError::WrongValueCount { letter, expected: vals.len(), got });
        }
        vals.copy_from_slice(&scratch);
        *seen = true;
        Ok(())
    }

    pub fn try_get_float_array(&mut self, letter: char, vals: &mut [f64], seen: &mut bool, pad: bool) -> Result<()> {
        self.try_get_array(letter, vals, seen, pad)
    }

    pub fn try_get_int_array(&mut self, letter: char, vals: &mut [i32], seen: &mut bool, pad: bool) -> Result<()> {
        self.try_get_array(letter, vals, seen, pad)
    }

    pub fn try_get_unsigned_array(&mut self, letter: char, vals: &mut [u32], seen: &mut bool, pad: bool) -> Result<()> {
        self.try_get_array(letter, vals, seen, pad)
    }

    pub fn try_get_quoted_string(&mut self, letter: char, out: &mut String, seen: &mut bool) -> Result<()> {
        if self.seen(letter) {
            *out = self.get_quoted_string(false)?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_possibly_quoted_string(&mut self, letter: char, out: &mut String, seen: &mut bool) -> Result<()> {
        if self.seen(letter) {
            *out = self.get_possibly_quoted_string(false)?;
            *seen = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::ChannelConfig;
    use crate::error::GCodeError;
    use crate::gcode_buffer::{Command, GCodeBuffer};
    use crate::pool::StatePool;

    fn line(text: &str) -> GCodeBuffer {
        let mut gb = GCodeBuffer::new(ChannelConfig::new("test"), Arc::new(StatePool::new(2)));
        assert_eq!(gb.put_line(text), Ok(true), "{text:?} did not become ready");
        gb
    }

    #[test]
    fn decodes_letter_number_and_parameters() {
        let mut gb = line("G1 X10 Y20");
        assert_eq!(gb.command(), Some(Command { letter: 'G', number: Some(1), fraction: None }));
        assert!(gb.seen('X'));
        assert_eq!(gb.get_f_value(), Ok(10.0));
        assert!(gb.seen('Y'));
        assert_eq!(gb.get_f_value(), Ok(20.0));
        assert!(!gb.seen('Z'));
    }

    #[test]
    fn fraction_is_distinct_from_absent() {
        let gb = line("G0.1");
        assert_eq!(gb.command_letter(), Some('G'));
        assert_eq!(gb.command_number(), Some(0));
        assert_eq!(gb.command_fraction(), Some(1));
        assert_eq!(gb.command().map(|c| c.to_string()), Some("G0.1".to_string()));

        let gb = line("G1");
        assert_eq!(gb.command_fraction(), None);
        let gb = line("T");
        assert!(!gb.has_command_number());
    }

    #[test]
    fn line_number_prefix_is_skipped() {
        let gb = line("N42 M104 S210");
        assert_eq!(gb.command().map(|c| c.to_string()), Some("M104".to_string()));
    }

    #[test]
    fn negative_tool_number() {
        let gb = line("T-1");
        assert_eq!(gb.command_number(), Some(-1));
        assert_eq!(gb.command().map(|c| c.to_string()), Some("T-1".to_string()));
    }

    #[test]
    fn seen_is_case_sensitive_and_skips_quotes() {
        let mut gb = line("M587 S\"X net\" x5");
        assert!(!gb.seen('X'));
        assert!(gb.seen('x'));
        assert_eq!(gb.get_i_value(), Ok(5));
    }

    #[test]
    fn exponent_is_not_an_e_parameter() {
        let mut gb = line("G1 X1E2 E3");
        assert!(gb.seen('X'));
        assert_eq!(gb.get_f_value(), Ok(100.0));
        assert!(gb.seen('E'));
        assert_eq!(gb.get_f_value(), Ok(3.0));
    }

    #[test]
    fn getter_needs_a_fresh_seen() {
        let mut gb = line("G1 X5");
        assert_eq!(gb.get_f_value(), Err(GCodeError::NoParameter));
        assert!(gb.seen('X'));
        assert_eq!(gb.get_f_value(), Ok(5.0));
        assert_eq!(gb.get_f_value(), Err(GCodeError::NoParameter));
    }

    #[test]
    fn malformed_numbers_fail() {
        let mut gb = line("G1 Xabc S-4");
        assert!(gb.seen('X'));
        assert!(matches!(gb.get_f_value(), Err(GCodeError::MalformedParameter(_))));
        assert!(gb.seen('S'));
        assert!(matches!(gb.get_ui_value(), Err(GCodeError::MalformedParameter(_))));
        assert!(gb.seen('S'));
        assert_eq!(gb.get_i_value(), Ok(-4));
    }

    #[test]
    fn quoted_string_unescapes_doubled_quotes() {
        let mut gb = line(r#"M117 P"He said ""hi""""#);
        assert!(gb.seen('P'));
        assert_eq!(gb.get_quoted_string(false), Ok("He said \"hi\"".to_string()));
    }

    #[test]
    fn quoted_string_failures() {
        let mut gb = line(r#"M98 P"" Q"open"#);
        assert!(gb.seen('P'));
        assert_eq!(gb.get_quoted_string(false), Err(GCodeError::MalformedParameter("empty string")));
        assert!(gb.seen('P'));
        assert_eq!(gb.get_quoted_string(true), Ok(String::new()));
        assert!(gb.seen('Q'));
        assert_eq!(gb.get_quoted_string(false), Err(GCodeError::MalformedParameter("unterminated string")));
        assert!(!gb.seen('R'));
    }

    #[test]
    fn possibly_quoted_string() {
        let mut gb = line(r#"M550 Pmyprinter S"two words""#);
        assert!(gb.seen('P'));
        assert_eq!(gb.get_possibly_quoted_string(false), Ok("myprinter".to_string()));
        assert!(gb.seen('S'));
        assert_eq!(gb.get_possibly_quoted_string(false), Ok("two words".to_string()));
    }

    #[test]
    fn unprecedented_string_takes_the_rest() {
        let mut gb = line("M117 Hello Mum, G28 done  ");
        assert_eq!(gb.get_unprecedented_string(), Ok("Hello Mum, G28 done".to_string()));
        let mut gb = line("M117");
        assert!(gb.get_unprecedented_string().is_err());
    }

    #[test]
    fn array_padding() {
        let mut gb = line("M92 X1:2");
        let mut padded = [0.0; 4];
        assert!(gb.seen('X'));
        assert_eq!(gb.get_float_array(&mut padded, true), Ok(4));
        assert_eq!(padded, [1.0, 2.0, 2.0, 2.0]);

        let mut plain = [9.0; 4];
        assert!(gb.seen('X'));
        assert_eq!(gb.get_float_array(&mut plain, false), Ok(2));
        assert_eq!(plain, [1.0, 2.0, 9.0, 9.0]);
    }

    #[test]
    fn array_too_long_or_malformed() {
        let mut gb = line("M906 X1:2:3 Y1::2");
        let mut out = [0u32; 2];
        assert!(gb.seen('X'));
        assert_eq!(gb.get_unsigned_array(&mut out, false), Err(GCodeError::TooManyValues { max: 2 }));
        assert_eq!(out, [0, 0]);

        let mut ints = [7i32; 3];
        assert!(gb.seen('Y'));
        assert!(gb.get_int_array(&mut ints, false).is_err());
        assert_eq!(ints, [7, 7, 7]);
    }

    #[test]
    fn try_get_leaves_defaults_when_absent() {
        let mut gb = line("M106 P1 S0.5");
        let mut fan = 0u32;
        let mut speed = 1.0;
        let mut temp = -273;
        let mut seen = false;
        gb.try_get_i_value('T', &mut temp, &mut seen).unwrap();
        assert!(!seen);
        assert_eq!(temp, -273);
        gb.try_get_ui_value('P', &mut fan, &mut seen).unwrap();
        gb.try_get_f_value('S', &mut speed, &mut seen).unwrap();
        assert!(seen);
        assert_eq!((fan, speed), (1, 0.5));

        // seen is never cleared
        gb.try_get_f_value('Z', &mut speed, &mut seen).unwrap();
        assert!(seen);
    }

    #[test]
    fn try_get_array_demands_exact_count() {
        let mut gb = line("M566 X1:2 Y5");
        let mut xyz = [0.0; 3];
        let mut seen = false;
        assert_eq!(
            gb.try_get_float_array('X', &mut xyz, &mut seen, false),
            Err(GCodeError::WrongValueCount { letter: 'X', expected: 3, got: 2 })
        );
        assert!(!seen);
        assert_eq!(xyz, [0.0; 3]);

        gb.try_get_float_array('Y', &mut xyz, &mut seen, true).unwrap();
        assert!(seen);
        assert_eq!(xyz, [5.0; 3]);
    }

    #[test]
    fn try_get_strings() {
        let mut gb = line(r#"M587 S"home" Pwifi"#);
        let mut ssid = String::from("default");
        let mut pass = String::new();
        let mut seen = false;
        gb.try_get_quoted_string('S', &mut ssid, &mut seen).unwrap();
        gb.try_get_possibly_quoted_string('P', &mut pass, &mut seen).unwrap();
        assert!(seen);
        assert_eq!((ssid.as_str(), pass.as_str()), ("home", "wifi"));
    }

    #[test]
    fn ip_and_mac_addresses() {
        let mut gb = line("M552 P192.168.1.10 M552 S1");
        assert!(gb.seen('P'));
        assert_eq!(gb.get_ip_address(), Ok([192, 168, 1, 10]));
        assert!(gb.seen('P'));
        assert_eq!(gb.get_ip_address_u32(), Ok(u32::from_le_bytes([192, 168, 1, 10])));

        let mut gb = line("M540 PBE:EF:DE:AD:FE:ED");
        assert!(gb.seen('P'));
        assert_eq!(gb.get_mac_address(), Ok([0xbe, 0xef, 0xde, 0xad, 0xfe, 0xed]));

        let mut gb = line("M540 P01-02-03-04-05-06");
        assert!(gb.seen('P'));
        assert_eq!(gb.get_mac_address(), Ok([1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn bad_addresses_fail() {
        for bad in ["M552 P192.168.1", "M552 P1.2.3.4.5", "M552 P256.1.1.1", "M552 P1..2.3"] {
            let mut gb = line(bad);
            assert!(gb.seen('P'));
            assert!(gb.get_ip_address().is_err(), "{bad}");
        }
        let mut gb = line("M540 P01:02:03:04:05");
        assert!(gb.seen('P'));
        assert!(gb.get_mac_address().is_err());
        let mut gb = line("M540 P01:02:03:04:05:100");
        assert!(gb.seen('P'));
        assert!(gb.get_mac_address().is_err());
    }

    #[test]
    fn several_commands_on_one_line() {
        let mut gb = line("G28 X M104 S200 G1 X5");
        assert_eq!(gb.command().map(|c| c.to_string()), Some("G28".to_string()));
        assert!(gb.seen('X'));
        assert!(!gb.seen('S'));

        gb.set_finished(true);
        assert!(gb.is_ready());
        assert_eq!(gb.command().map(|c| c.to_string()), Some("M104".to_string()));
        assert!(gb.seen('S'));
        assert_eq!(gb.get_ui_value(), Ok(200));

        gb.set_finished(false);
        assert!(gb.is_executing());
        gb.set_finished(true);
        assert_eq!(gb.command().map(|c| c.to_string()), Some("G1".to_string()));
        assert!(gb.seen('X'));
        assert_eq!(gb.get_f_value(), Ok(5.0));

        gb.set_finished(true);
        assert!(gb.is_idle());
        assert!(gb.starting_new_code());
    }

    #[test]
    fn free_text_commands_are_not_split() {
        let mut gb = line("M117 Going Home");
        gb.set_finished(true);
        assert!(gb.is_idle());
    }
}
