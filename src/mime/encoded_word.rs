//! RFC 2047 encoded-word decoding for header values.
//!
//! Unlike `mailparse`'s lenient decoding, a well-formed word whose payload or
//! charset cannot be decoded is an error, so callers can keep the raw header.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use encoding_rs::Encoding;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodedWordError {
    #[error("unknown charset {0:?}")]
    UnknownCharset(String),
    #[error("unknown encoding {0:?}")]
    UnknownEncoding(char),
    #[error("invalid base64 payload")]
    Base64,
    #[error("invalid quoted-printable payload")]
    QuotedPrintable,
    #[error("payload is not valid {0}")]
    Charset(&'static str),
}

struct Word<'a> {
    charset: &'a str,
    encoding: char,
    text: &'a str,
    /// Byte length of the whole `=?...?=` token.
    len: usize,
}

/// Find a syntactically complete encoded word at the start of `s`.
fn parse_word(s: &str) -> Option<Word<'_>> {
    let rest = s.strip_prefix("=?")?;
    let charset_end = rest.find('?')?;
    let charset = &rest[..charset_end];
    let rest = &rest[charset_end + 1..];
    let mut chars = rest.chars();
    let encoding = chars.next()?;
    let rest = chars.as_str().strip_prefix('?')?;
    let text_end = rest.find("?=")?;
    if charset.is_empty() {
        return None;
    }
    let text = &rest[..text_end];
    if text.contains(char::is_whitespace) {
        return None;
    }
    let len = 2 + charset_end + 1 + encoding.len_utf8() + 1 + text_end + 2;
    Some(Word {
        charset,
        encoding,
        text,
        len,
    })
}

fn decode_q(text: &str) -> Result<Vec<u8>, EncodedWordError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .ok_or(EncodedWordError::QuotedPrintable)?;
                let b = u8::from_str_radix(hex, 16).map_err(|_| EncodedWordError::QuotedPrintable)?;
                out.push(b);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Ok(out)
}

fn decode_word(word: &Word<'_>) -> Result<String, EncodedWordError> {
    let bytes = match word.encoding.to_ascii_uppercase() {
        'B' => STANDARD
            .decode(word.text)
            .or_else(|_| STANDARD_NO_PAD.decode(word.text))
            .map_err(|_| EncodedWordError::Base64)?,
        'Q' => decode_q(word.text)?,
        other => return Err(EncodedWordError::UnknownEncoding(other)),
    };
    // RFC 2231 allows a language suffix: `UTF-8*en`.
    let label = word.charset.split('*').next().unwrap_or(word.charset);
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| EncodedWordError::UnknownCharset(word.charset.to_string()))?;
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(|s| s.into_owned())
        .ok_or(EncodedWordError::Charset(encoding.name()))
}

/// Decode every encoded word in `header`. Whitespace that only separates two
/// encoded words is dropped; everything else is copied through.
pub fn decode_header(header: &str) -> Result<String, EncodedWordError> {
    let mut out = String::with_capacity(header.len());
    let mut rest = header;
    let mut pending_ws: Option<&str> = None;
    let mut last_was_word = false;

    while !rest.is_empty() {
        if let Some(word) = parse_word(rest) {
            if let Some(ws) = pending_ws.take() {
                if !last_was_word {
                    out.push_str(ws);
                }
            }
            out.push_str(&decode_word(&word)?);
            rest = &rest[word.len..];
            last_was_word = true;
            continue;
        }

        let ws_len = rest.len() - rest.trim_start().len();
        if ws_len > 0 {
            if let Some(ws) = pending_ws.take() {
                out.push_str(ws);
            }
            pending_ws = Some(&rest[..ws_len]);
            rest = &rest[ws_len..];
            continue;
        }

        if let Some(ws) = pending_ws.take() {
            out.push_str(ws);
        }
        // Copy a run of text up to the next whitespace or `=`.
        let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
        let next = rest[first..]
            .find(|c: char| c.is_whitespace() || c == '=')
            .map(|i| i + first)
            .unwrap_or(rest.len());
        out.push_str(&rest[..next]);
        rest = &rest[next..];
        last_was_word = false;
    }
    if let Some(ws) = pending_ws {
        out.push_str(ws);
    }
    Ok(out)
}

/// Unfold a header value: continuation lines are joined with a single space.
pub fn unfold(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, line) in raw.split('\n').enumerate() {
        let line = line.trim_end_matches('\r');
        if i == 0 {
            out.push_str(line.trim_end());
        } else {
            let cont = line.trim();
            if cont.is_empty() {
                continue;
            }
            out.push(' ');
            out.push_str(cont);
        }
    }
    out.trim().to_string()
}

/// Decode a `Subject` value, keeping the raw text when decoding fails.
pub fn decode_subject(raw: &str) -> String {
    let unfolded = unfold(raw);
    match decode_header(&unfolded) {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!("subject left undecoded: {e}");
            unfolded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(decode_header("Hello world").unwrap(), "Hello world");
        assert_eq!(decode_header("a =? b").unwrap(), "a =? b");
        assert_eq!(decode_header("").unwrap(), "");
    }

    #[test]
    fn decodes_base64_utf8() {
        assert_eq!(decode_header("=?UTF-8?B?0J/RgNC40LLQtdGC?=").unwrap(), "Привет");
    }

    #[test]
    fn decodes_q_latin1() {
        assert_eq!(
            decode_header("=?ISO-8859-1?Q?Caf=E9_au_lait?=").unwrap(),
            "Café au lait"
        );
    }

    #[test]
    fn joins_adjacent_words_and_keeps_surrounding_text() {
        assert_eq!(
            decode_header("Re: =?UTF-8?B?0J/RgNC40LLQtdGC?= =?utf-8?b?0LzQuNGA?= !").unwrap(),
            "Re: Приветмир !"
        );
    }

    #[test]
    fn malformed_word_is_an_error() {
        assert!(decode_header("=?UTF-8?B?!!!notbase64!!!?=").is_err());
        assert!(decode_header("=?x-unknown-charset?B?aGVsbG8=?=").is_err());
        assert!(decode_header("=?UTF-8?X?aGVsbG8=?=").is_err());
        assert!(decode_header("=?UTF-8?Q?bad=ZZ?=").is_err());
        assert!(decode_header("=?UTF-8?Q?a=+F?=").is_err());
        assert!(decode_header("=?UTF-8?Q?a=-1?=").is_err());
    }

    #[test]
    fn subject_falls_back_to_raw_header() {
        let raw = "=?UTF-8?B?!!!notbase64!!!?=";
        assert_eq!(decode_subject(raw), raw);
        assert_eq!(decode_subject("=?UTF-8?B?aGVsbG8=?="), "hello");
    }

    #[test]
    fn unfolds_continuation_lines() {
        assert_eq!(unfold("Hello\r\n world"), "Hello world");
        assert_eq!(
            decode_subject("=?UTF-8?B?0J/RgNC40LLQtdGC?=\r\n =?UTF-8?B?0LzQuNGA?="),
            "Приветмир"
        );
    }
}
