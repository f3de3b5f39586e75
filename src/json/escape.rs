/// Lazy string decoding for parser spans
///
/// The parser never copies or decodes strings. Keys and string values are
/// handed out as [`RawStr`] spans borrowed from the input; decoding happens
/// only when a consumer calls [`RawStr::unescape`].
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    #[error("invalid escape sequence at byte {0} of string")]
    InvalidEscape(usize),

    #[error("unpaired UTF-16 surrogate at byte {0} of string")]
    UnpairedSurrogate(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Escaped, not yet decoded string span from the source buffer.
///
/// The span excludes the surrounding quotes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawStr<'a>(&'a [u8]);

impl<'a> RawStr<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode escape sequences into an owned UTF-8 string.
    ///
    /// `\uXXXX` escapes are encoded as UTF-8; a high surrogate must be
    /// immediately followed by an escaped low surrogate and the pair yields a
    /// single code point at or above U+10000.
    pub fn unescape(&self) -> Result<String, EscapeError> {
        let src = self.0;
        let mut out = Vec::with_capacity(src.len());
        let mut i = 0;

        while i < src.len() {
            let byte = src[i];
            if byte != b'\\' {
                out.push(byte);
                i += 1;
                continue;
            }

            let escape_at = i;
            let kind = *src.get(i + 1).ok_or(EscapeError::InvalidEscape(escape_at))?;
            i += 2;
            match kind {
                b'"' | b'\\' | b'/' => out.push(kind),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0c),
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'u' => {
                    let unit = read_hex4(src, i).ok_or(EscapeError::InvalidEscape(escape_at))?;
                    i += 4;

                    let code_point = match unit {
                        0xD800..=0xDBFF => {
                            if src.get(i) != Some(&b'\\') || src.get(i + 1) != Some(&b'u') {
                                return Err(EscapeError::UnpairedSurrogate(escape_at));
                            }
                            let low = read_hex4(src, i + 2)
                                .ok_or(EscapeError::InvalidEscape(i))?;
                            if !(0xDC00..=0xDFFF).contains(&low) {
                                return Err(EscapeError::UnpairedSurrogate(escape_at));
                            }
                            i += 6;
                            0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00)
                        }
                        0xDC00..=0xDFFF => return Err(EscapeError::UnpairedSurrogate(escape_at)),
                        _ => unit,
                    };

                    let ch = char::from_u32(code_point)
                        .ok_or(EscapeError::InvalidEscape(escape_at))?;
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                _ => return Err(EscapeError::InvalidEscape(escape_at)),
            }
        }

        String::from_utf8(out).map_err(|_| EscapeError::InvalidUtf8)
    }
}

fn read_hex4(src: &[u8], at: usize) -> Option<u32> {
    let digits = src.get(at..at + 4)?;
    digits.iter().try_fold(0u32, |acc, &d| {
        let v = (d as char).to_digit(16)?;
        Some(acc * 16 + v)
    })
}

impl fmt::Debug for RawStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawStr({:?})", String::from_utf8_lossy(self.0))
    }
}

impl fmt::Display for RawStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unescape(s: &str) -> Result<String, EscapeError> {
        RawStr::new(s.as_bytes()).unescape()
    }

    #[test]
    fn test_plain_string_is_unchanged() {
        assert_eq!(unescape("/usr/bin/app").unwrap(), "/usr/bin/app");
        assert_eq!(unescape("").unwrap(), "");
    }

    #[test]
    fn test_quotes_and_newline() {
        let decoded = unescape(r#"He said \"hi\"\n"#).unwrap();
        assert_eq!(decoded, "He said \"hi\"\n");
        assert_eq!(decoded.as_bytes().last(), Some(&b'\n'));
    }

    #[test]
    fn test_simple_escapes() {
        assert_eq!(unescape(r"a\\b\/c\td\re\bf\fg").unwrap(), "a\\b/c\td\re\u{8}f\u{c}g");
    }

    #[test]
    fn test_bmp_escapes_encode_as_utf8() {
        assert_eq!(unescape(r"\u0041").unwrap(), "A");
        assert_eq!(unescape(r"\u00e9").unwrap().as_bytes(), &[0xC3, 0xA9]);
        assert_eq!(unescape(r"\u20AC").unwrap().as_bytes(), &[0xE2, 0x82, 0xAC]);
    }

    #[test]
    fn test_surrogate_pair_forms_single_code_point() {
        let decoded = unescape(r"\uD83D\uDE00").unwrap();
        assert_eq!(decoded, "\u{1F600}");
        assert_eq!(decoded.as_bytes(), &[0xF0, 0x9F, 0x98, 0x80]);
    }

    #[test]
    fn test_unpaired_surrogates_are_rejected() {
        assert_eq!(unescape(r"\uD83D"), Err(EscapeError::UnpairedSurrogate(0)));
        assert_eq!(unescape(r"x\uD83Dabc"), Err(EscapeError::UnpairedSurrogate(1)));
        assert_eq!(unescape(r"\uDE00"), Err(EscapeError::UnpairedSurrogate(0)));
        assert_eq!(
            unescape(r"\uD83D\u0041"),
            Err(EscapeError::UnpairedSurrogate(0))
        );
    }

    #[test]
    fn test_bad_escapes_are_rejected() {
        assert_eq!(unescape(r"\x"), Err(EscapeError::InvalidEscape(0)));
        assert_eq!(unescape(r"ab\u12"), Err(EscapeError::InvalidEscape(2)));
        assert_eq!(unescape("trailing\\"), Err(EscapeError::InvalidEscape(8)));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let raw = RawStr::new(&[b'a', 0xFF, b'b']);
        assert_eq!(raw.unescape(), Err(EscapeError::InvalidUtf8));
    }
}
