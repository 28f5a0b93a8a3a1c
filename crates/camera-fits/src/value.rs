//! Header card values.
//!
//! Camera amplifier headers only carry logical, integer, float and string
//! values, so complex values are not modelled; a card holding one parses as
//! a card without a value.

use core::str;

/// A parsed FITS header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// FITS logical value (`T` or `F`).
    Logical(bool),
    /// FITS integer value.
    Integer(i64),
    /// FITS floating-point value.
    Float(f64),
    /// FITS character string, trailing blanks removed.
    String(String),
}

impl Value {
    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

/// Find a ` /` comment separator starting at `from` and return the trimmed
/// comment text after it.
fn comment_after(field: &[u8], from: usize) -> (usize, Option<&str>) {
    let len = field.len();
    let mut i = from;
    while i + 1 < len {
        if field[i] == b' ' && field[i + 1] == b'/' {
            let mut start = i + 2;
            if start < len && field[start] == b' ' {
                start += 1;
            }
            let comment = str::from_utf8(&field[start..])
                .ok()
                .map(|s| s.trim_end())
                .filter(|s| !s.is_empty());
            return (i, comment);
        }
        i += 1;
    }
    (len, None)
}

/// Parse a quoted string value. Doubled quotes inside the string stand for a
/// literal quote; an unterminated string is accepted as-is.
fn parse_string(field: &[u8]) -> Option<(Value, Option<&str>)> {
    if field.first() != Some(&b'\'') {
        return None;
    }

    let mut value = String::new();
    let mut i = 1;
    while i < field.len() {
        if field[i] == b'\'' {
            if field.get(i + 1) == Some(&b'\'') {
                value.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            break;
        }
        value.push(field[i] as char);
        i += 1;
    }

    let (_, comment) = comment_after(field, i.min(field.len()));
    Some((Value::String(value.trim_end().to_string()), comment))
}

fn parse_float_str(s: &str) -> Option<f64> {
    s.replace(['D', 'd'], "E").parse::<f64>().ok()
}

/// Parse a FITS header value from the 70-byte value field of a card
/// (bytes 10..80).
///
/// Returns the value and an optional comment, or `None` when the field is
/// empty or holds something other than a logical, integer, float or string.
pub fn parse_value(value_bytes: &[u8]) -> Option<(Value, Option<&str>)> {
    let start = value_bytes.iter().position(|&b| b != b' ')?;
    let field = &value_bytes[start..];

    match field[0] {
        b'\'' => return parse_string(field),
        b'/' => return None,
        _ => {}
    }

    let (end, comment) = comment_after(field, 0);
    let text = str::from_utf8(&field[..end]).ok()?.trim();
    if text.is_empty() {
        return None;
    }

    let value = match text {
        "T" => Value::Logical(true),
        "F" => Value::Logical(false),
        _ if !text.contains(['.', 'E', 'e', 'D', 'd']) => Value::Integer(text.parse().ok()?),
        _ => Value::Float(parse_float_str(text)?),
    };
    Some((value, comment))
}

/// Serialize a [`Value`] into the 70-byte value field of a card.
///
/// Numeric and logical values are right-justified in the first 20 bytes;
/// strings start with a quote at byte 0 and are padded to at least eight
/// characters.
pub fn format_value(value: &Value) -> [u8; 70] {
    let mut buf = [b' '; 70];
    match value {
        Value::Logical(b) => buf[19] = if *b { b'T' } else { b'F' },
        Value::Integer(n) => right_justify(n.to_string().as_bytes(), &mut buf[..20]),
        Value::Float(f) => right_justify(format_float(*f).as_bytes(), &mut buf[..20]),
        Value::String(s) => write_string(s, &mut buf),
    }
    buf
}

fn right_justify(src: &[u8], dest: &mut [u8]) {
    let len = src.len().min(dest.len());
    let start = dest.len() - len;
    dest[start..].copy_from_slice(&src[..len]);
}

fn format_float(f: f64) -> String {
    if f == 0.0 {
        return String::from("0.0");
    }
    let mut precision = 15usize;
    loop {
        let s = format!("{:.prec$E}", f, prec = precision);
        if s.len() <= 20 || precision == 0 {
            return s;
        }
        precision -= 1;
    }
}

fn write_string(s: &str, buf: &mut [u8; 70]) {
    buf[0] = b'\'';
    let mut pos = 1;
    for ch in s.bytes() {
        let needed = if ch == b'\'' { 2 } else { 1 };
        if pos + needed >= 70 {
            break;
        }
        buf[pos] = ch;
        if ch == b'\'' {
            buf[pos + 1] = b'\'';
        }
        pos += needed;
    }
    pos = pos.max(9);
    buf[pos] = b'\'';
}
