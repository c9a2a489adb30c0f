//! Value-rendering transforms named by a field's `format` attribute.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `0x`-prefixed lowercase hex (integers) or plain hex (byte strings).
    Hex,
    /// Decimal text.
    Dec,
    /// Printable ASCII, `.` for anything else.
    Ascii,
    /// Keep the raw value.
    Bytes,
}

impl Format {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hex" => Some(Format::Hex),
            "dec" => Some(Format::Dec),
            "ascii" => Some(Format::Ascii),
            "bytes" => Some(Format::Bytes),
            _ => None,
        }
    }

    pub fn apply(self, value: Value) -> Value {
        match (self, value) {
            (Format::Bytes, v) => v,
            (Format::Hex, Value::Uint(x)) => Value::Text(format!("{:#x}", x)),
            (Format::Hex, Value::Wide(x)) => Value::Text(format!("{:#x}", x)),
            (Format::Hex, Value::Bytes(b)) => Value::Text(hex::encode(b)),
            (Format::Dec, Value::Uint(x)) => Value::Text(x.to_string()),
            (Format::Dec, Value::Wide(x)) => Value::Text(x.to_string()),
            (Format::Ascii, Value::Bytes(b)) => Value::Text(
                b.iter()
                    .map(|&c| if c.is_ascii_graphic() || c == b' ' { c as char } else { '.' })
                    .collect(),
            ),
            (_, v) => v,
        }
    }
}
