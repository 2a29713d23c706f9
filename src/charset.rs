// src/charset.rs
use encoding_rs::{DecoderResult, Encoding};
use std::fmt;

/// Legacy 8-bit (or UTF-8) encoding a game server declares for its strings.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    encoding: &'static Encoding,
}

impl Charset {
    /// Looks up a charset by label ("Windows-1252", "UTF-8", "ISO-8859-1", ...).
    /// Returns `None` for labels the converter does not know.
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(|encoding| Self { encoding })
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Decodes `bytes` to UTF-8. Byte sequences that are not valid in this
    /// charset are dropped, never replaced.
    pub fn to_utf8(&self, bytes: &[u8]) -> String {
        let mut decoder = self.encoding.new_decoder_without_bom_handling();
        let capacity = decoder
            .max_utf8_buffer_length_without_replacement(bytes.len())
            .unwrap_or(bytes.len().saturating_mul(3));
        let mut decoded = String::with_capacity(capacity);
        let mut remaining = bytes;

        loop {
            let (result, read) =
                decoder.decode_to_string_without_replacement(remaining, &mut decoded, true);
            remaining = &remaining[read..];
            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::Malformed(_, _) => continue,
                DecoderResult::OutputFull => {
                    let extra = decoder
                        .max_utf8_buffer_length_without_replacement(remaining.len())
                        .unwrap_or(remaining.len().saturating_mul(3));
                    decoded.reserve(extra.max(4));
                }
            }
        }

        decoded
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::WINDOWS_1252,
        }
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euro_sign_in_windows_1252() {
        let charset = Charset::for_label("Windows-1252").unwrap();
        assert_eq!(charset.to_utf8(b"\x80"), "€");
        assert_eq!(charset.to_utf8(b"caf\xe9"), "café");
    }

    #[test]
    fn invalid_utf8_bytes_are_dropped() {
        let charset = Charset::for_label("UTF-8").unwrap();
        assert_eq!(charset.to_utf8(b"\x80"), "");
        assert_eq!(charset.to_utf8(b"ab\xffcd\xc3"), "abcd");
        assert_eq!(charset.to_utf8("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn representable_names_survive_encoding_round_trip() {
        let charset = Charset::for_label("windows-1252").unwrap();
        for name in ["Padawan", "Kyle Katarn", "Señor Jedi", "€uro", "Æther ß"] {
            let (encoded, _, unmappable) = encoding_rs::WINDOWS_1252.encode(name);
            assert!(!unmappable);
            assert_eq!(charset.to_utf8(&encoded), name);
        }
    }

    #[test]
    fn unknown_label() {
        assert!(Charset::for_label("klingon-8").is_none());
        assert_eq!(Charset::default().name(), "windows-1252");
    }
}
