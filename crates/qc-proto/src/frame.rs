//! `$<tag>,<v1>,<v2>,...*<CS>` text frames.
//!
//! `CS` is the XOR of every byte between `$` and `*`, rendered as two upper-case
//! hex digits (the NMEA 0183 checksum). It is an integrity check only: any single
//! bit flip is caught, but two flips in the same bit position of different bytes
//! cancel out and pass.

use crate::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: String,
    pub values: Vec<i32>,
}

/// XOR-fold of `payload` as two upper-case hex digits. Empty input gives `"00"`.
pub fn checksum(payload: &str) -> String {
    let cs = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    hex::encode_upper([cs])
}

pub fn encode(tag: &str, values: &[i32]) -> String {
    let mut base = String::from(tag);
    for v in values {
        base.push(',');
        base.push_str(&v.to_string());
    }
    format!("${}*{}", base, checksum(&base))
}

/// A checksum-verified frame whose fields are still text.
///
/// Lets callers reject a foreign tag before any field is parsed as a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame<'a> {
    pub tag: &'a str,
    pub fields: Vec<&'a str>,
}

impl RawFrame<'_> {
    pub fn values(&self) -> Result<Vec<i32>, ProtoError> {
        self.fields
            .iter()
            .map(|t| t.parse::<i32>().map_err(|_| ProtoError::InvalidValue(t.to_string())))
            .collect()
    }
}

/// Envelope and checksum checks only.
pub fn decode_raw(raw: &str) -> Result<RawFrame<'_>, ProtoError> {
    let parts: Vec<&str> = raw.split('*').collect();
    if parts.len() != 2 {
        return Err(ProtoError::MalformedFrame(format!(
            "expected exactly one '*', found {}",
            parts.len() - 1
        )));
    }
    let (head, found) = (parts[0], parts[1]);
    let body = head
        .strip_prefix('$')
        .ok_or_else(|| ProtoError::MalformedFrame("missing leading '$'".into()))?;

    let expected = checksum(body);
    if expected != found {
        return Err(ProtoError::ChecksumMismatch { expected, found: found.to_string() });
    }

    let mut tokens = body.split(',');
    let tag = tokens.next().unwrap_or_default();
    Ok(RawFrame { tag, fields: tokens.collect() })
}

pub fn decode(raw: &str) -> Result<Frame, ProtoError> {
    let frame = decode_raw(raw)?;
    Ok(Frame { tag: frame.tag.to_string(), values: frame.values()? })
}
