//! Identifier codec and permissive datetime parsing.
//!
//! Presumed target identifiers exchanged before a record is materialized
//! are the base64 encoding of a clear-text location string (typically a
//! source URL or DOI with the scheme prefix stripped). The resolver decodes
//! them to compare against a record's declared digital-object-location.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::model::ModelError;

/// Encodes a clear-text location string as an opaque identifier.
///
/// # Errors
///
/// Returns [`ModelError::InvalidArgument`] if the input is empty.
pub fn encode_identifier(cleartext: &str) -> Result<String, ModelError> {
    if cleartext.is_empty() {
        return Err(ModelError::InvalidArgument(
            "identifier to encode must not be empty".to_string(),
        ));
    }
    Ok(STANDARD.encode(cleartext.as_bytes()))
}

/// Decodes an opaque identifier back to its clear-text location string.
///
/// # Errors
///
/// Returns [`ModelError::InvalidArgument`] if the input is empty, not valid
/// base64, or not valid UTF-8.
pub fn decode_identifier(encoded: &str) -> Result<String, ModelError> {
    if encoded.is_empty() {
        return Err(ModelError::InvalidArgument(
            "identifier to decode must not be empty".to_string(),
        ));
    }
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ModelError::InvalidArgument(format!("not valid base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| ModelError::InvalidArgument(format!("not valid UTF-8: {e}")))
}

/// Decodes an opaque identifier, falling back to the input itself.
///
/// Presumed targets may already be final PIDs rather than encoded
/// locations; those compare against records verbatim.
pub fn decode_identifier_lossy(encoded: &str) -> String {
    decode_identifier(encoded).unwrap_or_else(|_| encoded.to_string())
}

/// Parses a datetime from an arbitrary string.
///
/// Accepts RFC 3339 plus the common `%Y-%m-%d %H:%M:%S`,
/// `%Y-%m-%dT%H:%M:%S`, `%Y-%m-%dT%H:%M:%S%.f` and bare `%Y-%m-%d` shapes.
/// Offset-free inputs are interpreted as UTC.
///
/// # Errors
///
/// Returns [`ModelError::InvalidArgument`] if no supported shape matches.
pub fn parse_datetime(text: &str) -> Result<DateTime<Utc>, ModelError> {
    if text.is_empty() {
        return Err(ModelError::InvalidArgument(
            "datetime text must not be empty".to_string(),
        ));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&parsed));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    Err(ModelError::InvalidArgument(format!(
        "could not parse datetime from '{text}'"
    )))
}
