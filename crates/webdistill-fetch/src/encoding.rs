//! The Encoding Detector (spec §4.2): `decode(bytes, headers) -> (text,
//! detected_encoding)`, short-circuiting on the first successful step.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use webdistill_types::{ErrorKind, WebDistillError};

const META_SCAN_WINDOW: usize = 8192;

static CONTENT_TYPE_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)charset\s*=\s*"?'?([a-zA-Z0-9_\-]+)"?'?"#).unwrap());

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9_\-]+)["']?"#).unwrap()
});

/// Result of a successful decode: the resulting text and the canonical
/// encoding name that produced it (or `"utf-8-lossy"` for the final
/// fallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    pub text: String,
    pub detected_encoding: String,
}

/// Run the full detection chain: Content-Type header, then `<meta
/// charset>` scan of the first 8 KiB, then the CJK fallback chain (only if
/// the body looks CJK-ish), then `utf-8` lossy. Only fails if somehow every
/// step is skipped, which cannot happen since the lossy fallback always
/// succeeds — kept `Result`-returning to match the spec's stated contract
/// and to leave room for a future strict mode.
pub fn decode(bytes: &[u8], headers: &HashMap<String, String>) -> Result<DecodedBody, WebDistillError> {
    if let Some(label) = header_charset(headers) {
        if let Some(text) = try_decode_with_label(bytes, &label) {
            return Ok(DecodedBody {
                text,
                detected_encoding: canonicalize(&label),
            });
        }
    }

    if let Some(label) = meta_charset(bytes) {
        if let Some(text) = try_decode_with_label(bytes, &label) {
            return Ok(DecodedBody {
                text,
                detected_encoding: canonicalize(&label),
            });
        }
    }

    if looks_cjk(bytes) {
        for candidate in ["gb18030", "gbk", "gb2312", "big5", "utf-8"] {
            if let Some(text) = try_decode_with_label(bytes, candidate) {
                return Ok(DecodedBody {
                    text,
                    detected_encoding: candidate.to_string(),
                });
            }
        }
    }

    let (cow, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    let _ = had_errors;
    Ok(DecodedBody {
        text: cow.into_owned(),
        detected_encoding: "utf-8-lossy".to_string(),
    })
}

fn header_charset(headers: &HashMap<String, String>) -> Option<String> {
    let content_type = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.as_str())?;
    CONTENT_TYPE_CHARSET
        .captures(content_type)
        .map(|c| c[1].to_string())
}

fn meta_charset(bytes: &[u8]) -> Option<String> {
    let window = &bytes[..bytes.len().min(META_SCAN_WINDOW)];
    let prefix = String::from_utf8_lossy(window);
    META_CHARSET
        .captures(&prefix)
        .or_else(|| CONTENT_TYPE_CHARSET.captures(&prefix))
        .map(|c| c[1].to_string())
}

/// Heuristic: any byte >= 0x80 in the first scan window suggests a
/// non-ASCII, possibly CJK, encoding worth trying the fallback chain for.
/// Cheap and deliberately approximate — the chain itself validates.
fn looks_cjk(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(META_SCAN_WINDOW)
        .any(|&b| b >= 0x80)
}

fn canonicalize(label: &str) -> String {
    let lower = label.trim().to_lowercase();
    match lower.as_str() {
        "utf8" => "utf-8".to_string(),
        "latin1" | "iso8859-1" | "iso-8859-1" => "iso-8859-1".to_string(),
        "gb2312" | "gbk" | "gb18030" | "big5" | "utf-8" => lower,
        other => other.to_string(),
    }
}

fn try_decode_with_label(bytes: &[u8], label: &str) -> Option<String> {
    let canonical = canonicalize(label);
    let encoding = encoding_rs::Encoding::for_label(canonical.as_bytes())?;
    let (cow, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        None
    } else {
        Some(cow.into_owned())
    }
}

/// Map a decode-path failure (there currently is none — `decode` never
/// returns `Err`) to the routing-relevant error kind, for callers that want
/// to plumb a strict variant through later.
pub fn decode_failure(detail: impl Into<String>) -> WebDistillError {
    WebDistillError::classified(ErrorKind::DecodeFailure, detail.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn header_charset_takes_priority() {
        let body = "<html><head><meta charset=\"gbk\"></head></html>".as_bytes();
        let h = headers(&[("Content-Type", "text/html; charset=UTF-8")]);
        let decoded = decode(body, &h).unwrap();
        assert_eq!(decoded.detected_encoding, "utf-8");
    }

    #[test]
    fn falls_back_to_meta_charset_when_header_absent() {
        let body = "<html><head><meta charset=\"utf-8\"></head><body>hi</body></html>".as_bytes();
        let decoded = decode(body, &HashMap::new()).unwrap();
        assert_eq!(decoded.detected_encoding, "utf-8");
        assert!(decoded.text.contains("hi"));
    }

    #[test]
    fn falls_back_to_utf8_lossy_when_nothing_matches() {
        let body = b"<html><body>plain ascii</body></html>";
        let decoded = decode(body, &HashMap::new()).unwrap();
        assert_eq!(decoded.detected_encoding, "utf-8-lossy");
        assert_eq!(decoded.text, "<html><body>plain ascii</body></html>");
    }

    #[test]
    fn decodes_gb18030_body_via_cjk_chain() {
        let (encoded, _, _) = encoding_rs::GB18030.encode("\u{4f60}\u{597d}");
        let decoded = decode(&encoded, &HashMap::new()).unwrap();
        assert!(decoded.text.contains('\u{4f60}'));
    }
}
