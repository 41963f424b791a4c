//! Recovers the original image URL from a vendor CDN proxy URL.
//!
//! The CDN wraps `https://origin/path.jpg` as a percent-encoded suffix of its
//! own URL (`https://cdn.example/<opts>/https%3A%2F%2Forigin%2Fpath.jpg`) and
//! the page percent-encodes the whole thing once more in the `src`
//! attribute. Decoding is therefore two passes: a URI-level pass over the
//! whole string, then a component-level pass over the suffix that starts at
//! the first `/https`.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use thiserror::Error;

use crate::models::{NO_EXTRACT, NO_SLIDE};

const SPLIT_MARKER: &str = "/https";

/// Characters `decodeURI` leaves escaped.
const URI_RESERVED: &[u8] = b";/?:@&=+$,#";

/// Everything `encodeURIComponent` escapes.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("URI malformed")]
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedImage {
    pub original_url: String,
    pub encoded: String,
}

/// Decode a CDN image URL. Never fails: problems come back as sentinel
/// strings in `original_url`, with `encoded` preserved.
pub fn decode_image_url(encoded: Option<&str>) -> DecodedImage {
    let encoded = match encoded {
        Some(value) if !value.is_empty() => value,
        _ => {
            return DecodedImage {
                original_url: NO_EXTRACT.to_string(),
                encoded: String::new(),
            }
        }
    };

    let original_url = match extract_original(encoded) {
        Ok(Some(url)) => url,
        Ok(None) => NO_EXTRACT.to_string(),
        Err(err) => format!("Error: {err}"),
    };

    DecodedImage {
        original_url,
        encoded: encoded.to_string(),
    }
}

fn extract_original(encoded: &str) -> Result<Option<String>, DecodeError> {
    let outer = decode_uri(encoded)?;
    let Some(split_at) = outer.find(SPLIT_MARKER) else {
        return Ok(None);
    };
    // Skip the leading '/', keep "https..." through the end.
    let suffix = &outer[split_at + 1..];
    decode_uri_component(suffix).map(Some)
}

/// True when `url` is a real recovered URL rather than a sentinel.
pub fn is_analyzable(url: &str) -> bool {
    !url.is_empty() && url != NO_EXTRACT && url != NO_SLIDE && !url.starts_with("Error:")
}

/// `decodeURI`: decodes every escape except those for URI-reserved characters.
pub fn decode_uri(input: &str) -> Result<String, DecodeError> {
    check_escapes(input)?;
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(at) = next_reserved_escape(rest) {
        out.push_str(&decode_segment(&rest[..at])?);
        out.push_str(&rest[at..at + 3]);
        rest = &rest[at + 3..];
    }
    out.push_str(&decode_segment(rest)?);
    Ok(out)
}

/// `decodeURIComponent`: decodes every escape.
pub fn decode_uri_component(input: &str) -> Result<String, DecodeError> {
    check_escapes(input)?;
    decode_segment(input)
}

/// `encodeURIComponent`.
pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// The browser rejects a `%` not followed by two hex digits, where
/// `percent_decode` would pass it through.
fn check_escapes(input: &str) -> Result<(), DecodeError> {
    let bytes = input.as_bytes();
    for (at, _) in input.match_indices('%') {
        let valid = bytes
            .get(at + 1..at + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(DecodeError::Malformed);
        }
    }
    Ok(())
}

/// Offset of the first escape that encodes a URI-reserved character.
/// Escapes must already be validated.
fn next_reserved_escape(input: &str) -> Option<usize> {
    input.match_indices('%').find_map(|(at, _)| {
        let byte = u8::from_str_radix(input.get(at + 1..at + 3)?, 16).ok()?;
        URI_RESERVED.contains(&byte).then_some(at)
    })
}

fn decode_segment(input: &str) -> Result<String, DecodeError> {
    percent_decode_str(input)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| DecodeError::Malformed)
}
