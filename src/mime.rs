//! RFC 2047 MIME encoded-word decoding for ENVELOPE subjects
//!
//! Source IMAP servers commonly return subjects as one or more
//! `=?charset?encoding?text?=` encoded words. This module decodes the
//! Q and B encodings into a plain `String`. Only UTF-8 and common
//! Western charsets are expected in practice; bytes that don't decode
//! as UTF-8 are replaced with the Unicode replacement character
//! rather than failing the whole header.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use std::sync::LazyLock;

static ENCODED_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\?([^?]+)\?([BbQq])\?([^?]+)\?=").unwrap());

/// Placeholder subject for a message whose ENVELOPE subject is null.
pub const NO_SUBJECT: &str = "(no subject)";

/// Decode every RFC 2047 encoded word in `input`, leaving any
/// surrounding plain text untouched.
#[must_use]
pub fn decode_mime_header(input: &str) -> String {
    let mut result = String::new();
    let mut last_end = 0;
    for cap in ENCODED_WORD_RE.captures_iter(input) {
        let full_match = cap.get(0).unwrap();
        let encoding = &cap[2];
        let encoded_text = &cap[3];
        let start = full_match.start();
        let end = full_match.end();
        if start > last_end {
            result.push_str(&input[last_end..start]);
        }
        let decoded = match encoding.to_uppercase().as_str() {
            "B" => decode_base64(encoded_text),
            "Q" => decode_quoted_printable(encoded_text),
            _ => full_match.as_str().to_string(),
        };
        result.push_str(&decoded);
        last_end = end;
    }
    if last_end < input.len() {
        result.push_str(&input[last_end..]);
    }
    if last_end == 0 {
        input.to_string()
    } else {
        result
    }
}

fn decode_base64(encoded: &str) -> String {
    BASE64
        .decode(encoded)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_else(|_| encoded.to_string())
}

fn decode_quoted_printable(encoded: &str) -> String {
    let mut bytes = Vec::with_capacity(encoded.len());
    let chars: Vec<char> = encoded.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '_' => {
                bytes.push(b' ');
                i += 1;
            }
            '=' if i + 2 < chars.len() => {
                let hex: String = chars[i + 1..=i + 2].iter().collect();
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    bytes.push(byte);
                    i += 3;
                } else {
                    bytes.push(chars[i] as u8);
                    i += 1;
                }
            }
            c => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
