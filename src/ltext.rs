//! LTEXT: a localized string record. 4-byte header (24-bit length in
//! characters, little-endian, followed by a 1-byte encoding tag), then the
//! text itself.

use crate::error::Error;
use crate::stream::take;

const ENCODING_ASCII: u8 = 0;
const ENCODING_UTF8: u8 = 8;
const ENCODING_UTF16LE: u8 = 16;

const MAX_CHARS: usize = 65535;

/// A decoded LTEXT value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ltext {
    pub value: String,
}

impl Ltext {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 4 {
            return Err(Error::TruncatedInput { expected: 4, found: bytes.len() });
        }
        let mut pos = 0usize;
        // Length is little-endian here, unlike QFS's big-endian size fields, and
        // counts *characters*, not bytes — it can't be used to size a byte slice
        // for a variable-width encoding. The body instead runs to the end of the
        // blob, per the format's "implicit from the blob length" convention.
        let raw = take(bytes, &mut pos, 3)?;
        let _length_chars = (raw[0] as u32) | ((raw[1] as u32) << 8) | ((raw[2] as u32) << 16);
        let encoding = bytes[pos];
        pos += 1;

        let body = &bytes[pos..];
        let value = match encoding {
            ENCODING_ASCII => body.iter().map(|&b| b as char).collect(),
            ENCODING_UTF8 => String::from_utf8(body.to_vec())
                .map_err(|_| Error::MalformedRecord("LTEXT UTF-8 payload is not valid UTF-8".into()))?,
            ENCODING_UTF16LE => {
                let units: Vec<u16> = body.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                String::from_utf16(&units)
                    .map_err(|_| Error::MalformedRecord("LTEXT UTF-16LE payload is not valid UTF-16".into()))?
            }
            other => return Err(Error::MalformedRecord(format!("unknown LTEXT encoding byte {other:#x}"))),
        };

        Ok(Ltext { value })
    }

    /// Serialize to the wire form. Emission always uses UTF-16LE, per format
    /// convention, regardless of which encoding the value was originally read with.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let units: Vec<u16> = self.value.encode_utf16().collect();
        if units.len() > MAX_CHARS {
            return Err(Error::InvalidArgument(format!(
                "LTEXT value has {} characters, maximum is {MAX_CHARS}",
                units.len()
            )));
        }

        let mut out = Vec::with_capacity(4 + units.len() * 2);
        let length = units.len() as u32;
        out.push((length & 0xFF) as u8);
        out.push(((length >> 8) & 0xFF) as u8);
        out.push(((length >> 16) & 0xFF) as u8);
        out.push(ENCODING_UTF16LE);
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16le_round_trips() {
        let ltext = Ltext::new("Crystal Heights");
        let bytes = ltext.encode().unwrap();
        assert_eq!(bytes[3], ENCODING_UTF16LE);
        assert_eq!(Ltext::from_bytes(&bytes).unwrap(), ltext);
    }

    #[test]
    fn empty_string_round_trips() {
        let ltext = Ltext::new("");
        let bytes = ltext.encode().unwrap();
        assert_eq!(&bytes, &[0, 0, 0, ENCODING_UTF16LE]);
        assert_eq!(Ltext::from_bytes(&bytes).unwrap(), ltext);
    }

    #[test]
    fn reads_legacy_ascii_encoding() {
        let mut bytes = vec![5, 0, 0, ENCODING_ASCII];
        bytes.extend_from_slice(b"hello");
        assert_eq!(Ltext::from_bytes(&bytes).unwrap(), Ltext::new("hello"));
    }

    #[test]
    fn reads_utf8_encoding() {
        let text = "caf\u{e9}";
        let mut bytes = vec![text.chars().count() as u8, 0, 0, ENCODING_UTF8];
        bytes.extend_from_slice(text.as_bytes());
        assert_eq!(Ltext::from_bytes(&bytes).unwrap(), Ltext::new(text));
    }

    #[test]
    fn rejects_unknown_encoding_byte() {
        let bytes = [0, 0, 0, 200];
        assert!(matches!(Ltext::from_bytes(&bytes), Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn rejects_value_over_max_length() {
        let ltext = Ltext::new("a".repeat(MAX_CHARS + 1));
        assert!(matches!(ltext.encode(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(matches!(Ltext::from_bytes(&[1, 2]), Err(Error::TruncatedInput { .. })));
    }
}
