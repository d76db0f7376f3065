//! Turn a parsed message into its plain-text and HTML bodies.

use mailparse::{MailHeaderMap, ParsedMail};
use std::str::FromStr;
use tracing::debug;

/// Which part wins when a multipart message carries several parts of the
/// same text type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartPrecedence {
    FirstWins,
    #[default]
    LastWins,
}

impl FromStr for PartPrecedence {
    type Err = String;

    /// Accepts `first` or `last`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(PartPrecedence::FirstWins),
            "last" => Ok(PartPrecedence::LastWins),
            other => Err(format!("expected `first` or `last`, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBody {
    pub text: String,
    pub html: String,
}

/// Flat decoder: only the top-level parts of a multipart body are inspected.
/// Nested multiparts and non-text parts are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyDecoder {
    pub precedence: PartPrecedence,
}

impl BodyDecoder {
    pub fn new(precedence: PartPrecedence) -> Self {
        Self { precedence }
    }

    pub fn decode(&self, mail: &ParsedMail<'_>) -> DecodedBody {
        let Some(raw_ctype) = mail.headers.get_first_value("Content-Type") else {
            return plain(mail);
        };
        let Some(media_type) = media_type(&raw_ctype) else {
            return plain(mail);
        };

        if media_type.starts_with("multipart/") {
            if !mail.ctype.params.contains_key("boundary") {
                return plain(mail);
            }
            return self.decode_parts(mail);
        }

        let body = part_text(mail);
        if media_type.starts_with("text/html") {
            DecodedBody {
                text: String::new(),
                html: body,
            }
        } else {
            DecodedBody {
                text: body,
                html: String::new(),
            }
        }
    }

    fn decode_parts(&self, mail: &ParsedMail<'_>) -> DecodedBody {
        let mut text: Option<String> = None;
        let mut html: Option<String> = None;

        for part in &mail.subparts {
            let part_type = part
                .headers
                .get_first_value("Content-Type")
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            let slot = if part_type.starts_with("text/plain") {
                &mut text
            } else if part_type.starts_with("text/html") {
                &mut html
            } else {
                debug!("skipping part of type {:?}", part_type);
                continue;
            };
            if self.precedence == PartPrecedence::FirstWins && slot.is_some() {
                continue;
            }
            let body = part_text(part);
            // Base64 decoding discards line breaks, the delimiter's included.
            *slot = Some(if is_base64(part) {
                body
            } else {
                strip_delimiter_newline(body)
            });
        }

        DecodedBody {
            text: text.unwrap_or_default(),
            html: html.unwrap_or_default(),
        }
    }
}

fn plain(mail: &ParsedMail<'_>) -> DecodedBody {
    DecodedBody {
        text: part_text(mail),
        html: String::new(),
    }
}

/// Lowercased `type/subtype`, or `None` if the header is not a well-formed
/// media type with `; name=value` parameters.
fn media_type(raw: &str) -> Option<String> {
    let (mt, params) = match raw.find(';') {
        Some(i) => (&raw[..i], &raw[i..]),
        None => (raw, ""),
    };
    let mt = mt.trim().to_ascii_lowercase();
    let (ty, sub) = mt.split_once('/')?;
    if is_token(ty) && is_token(sub) && params_are_valid(params) {
        Some(mt)
    } else {
        None
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii() && c > ' ' && c != '\x7f' && !"()<>@,;:\\\"/[]?=".contains(c)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

/// `*(";" token "=" (token / quoted-string))`, trailing semicolons allowed.
fn params_are_valid(mut rest: &str) -> bool {
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return true;
        }
        let Some(r) = rest.strip_prefix(';') else {
            return false;
        };
        rest = r.trim_start();
        if rest.is_empty() || rest.starts_with(';') {
            continue;
        }

        let name_len = rest.find(|c: char| !is_token_char(c)).unwrap_or(rest.len());
        if name_len == 0 {
            return false;
        }
        let Some(r) = rest[name_len..].trim_start().strip_prefix('=') else {
            return false;
        };
        rest = r.trim_start();

        if let Some(quoted) = rest.strip_prefix('"') {
            let mut escaped = false;
            let mut end = None;
            for (i, c) in quoted.char_indices() {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => {
                        end = Some(i);
                        break;
                    }
                    _ => {}
                }
            }
            let Some(end) = end else {
                return false;
            };
            rest = &quoted[end + 1..];
        } else {
            let value_len = rest.find(|c: char| !is_token_char(c)).unwrap_or(rest.len());
            if value_len == 0 {
                return false;
            }
            rest = &rest[value_len..];
        }
    }
}

fn is_base64(part: &ParsedMail<'_>) -> bool {
    part.headers
        .get_first_value("Content-Transfer-Encoding")
        .is_some_and(|cte| cte.trim().eq_ignore_ascii_case("base64"))
}

/// Transfer-decoded body text. An explicit charset is honoured; without one
/// the bytes are taken as UTF-8.
fn part_text(part: &ParsedMail<'_>) -> String {
    if part.ctype.params.contains_key("charset") {
        if let Ok(s) = part.get_body() {
            return s;
        }
    }
    match part.get_body_raw() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!("undecodable part body: {e}");
            String::new()
        }
    }
}

/// The line break before a boundary line belongs to the delimiter.
fn strip_delimiter_newline(mut s: String) -> String {
    if s.ends_with("\r\n") {
        s.truncate(s.len() - 2);
    } else if s.ends_with('\n') {
        s.truncate(s.len() - 1);
    }
    s
}
