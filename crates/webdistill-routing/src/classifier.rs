//! The Error Classifier (spec §4.1): a pure function mapping low-level
//! fetch exceptions/responses to the closed [`ErrorKind`] enum. No I/O.

use std::collections::HashMap;

use webdistill_types::ErrorKind;

/// Markers that indicate a captcha/challenge page rather than real content.
/// Checked case-insensitively against the decoded body (or, conservatively,
/// the raw bytes interpreted as lossy UTF-8 when decoding hasn't happened
/// yet).
pub const CAPTCHA_MARKERS: &[&str] = &[
    "captcha",
    "verify you are human",
    "cf-challenge",
    "checking your browser",
];

/// Domains known to render primarily via client-side JavaScript, used by
/// the `JAVASCRIPT_REQUIRED` heuristic. This is a small seed list; routing
/// YAML's `domain`+`error_kind` escalation rules are the real mechanism —
/// this list only decides whether the *first* static fetch should even be
/// considered suspicious.
pub const LIKELY_JS_RENDERED_DOMAINS: &[&str] = &["react.dev", "vuejs.org", "angular.dev"];

/// Everything the classifier needs to know about one fetch attempt. Built
/// by the fetcher or by the orchestrator from a lower-level exception.
#[derive(Debug, Clone, Default)]
pub struct ClassifierInput<'a> {
    pub status_code: Option<u16>,
    pub redirect_count: u32,
    pub body: Option<&'a [u8]>,
    pub domain: &'a str,
    pub has_article_or_main_tag: bool,
    pub transport_error: Option<TransportError>,
}

/// Low-level transport failures a `static_http`/`headless_browser` fetcher
/// can observe before it ever gets a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Dns,
    Tls,
    ConnectionReset,
    Other,
}

/// Classify one fetch attempt into the closed `ErrorKind` set.
///
/// Order of checks matters and mirrors §4.1: transport-level failures are
/// checked first (they have no status code to reason about), then redirect
/// loop, then status code buckets, then content-based heuristics (captcha,
/// JS-required) which require a body.
pub fn classify(input: &ClassifierInput<'_>) -> Option<ErrorKind> {
    if let Some(transport) = input.transport_error {
        return Some(match transport {
            TransportError::Timeout => ErrorKind::NetworkTimeout,
            TransportError::Dns => ErrorKind::DnsFailure,
            TransportError::Tls => ErrorKind::TlsFailure,
            TransportError::ConnectionReset => ErrorKind::ConnectionReset,
            TransportError::Other => ErrorKind::FetcherInternal,
        });
    }

    if input.redirect_count > 10 {
        return Some(ErrorKind::RedirectLoop);
    }

    if let Some(status) = input.status_code {
        if status == 404 {
            return Some(ErrorKind::NotFound404);
        }
        if status == 401 || status == 403 || status == 429 {
            return Some(ErrorKind::Http4xxBlock);
        }
        if (500..600).contains(&status) {
            return Some(ErrorKind::Http5xx);
        }
    }

    if let Some(body) = input.body {
        if body_contains_captcha_marker(body) {
            return Some(ErrorKind::CaptchaDetected);
        }
        if body.len() < 1024
            && LIKELY_JS_RENDERED_DOMAINS.contains(&input.domain)
            && !input.has_article_or_main_tag
        {
            return Some(ErrorKind::JavascriptRequired);
        }
    }

    None
}

/// Case-insensitive substring search for any configured captcha marker.
/// Operates on lossy-UTF-8 of the body so it works even before the
/// Encoding Detector has run (the classifier must stay pure/no-I/O and
/// cannot assume a successfully decoded string is available yet).
pub fn body_contains_captcha_marker(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body).to_lowercase();
    CAPTCHA_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Convenience wrapper used by fetchers that already have headers, to pull
/// a best-effort redirect count/status straight from a response map. Kept
/// separate from `classify` so the core function stays free of any
/// particular HTTP client's types.
pub fn classify_http_response(
    status_code: u16,
    headers: &HashMap<String, String>,
    redirect_count: u32,
    body: &[u8],
    domain: &str,
    has_article_or_main_tag: bool,
) -> Option<ErrorKind> {
    let _ = headers; // reserved for future header-driven heuristics
    classify(&ClassifierInput {
        status_code: Some(status_code),
        redirect_count,
        body: Some(body),
        domain,
        has_article_or_main_tag,
        transport_error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_4xx_block_statuses() {
        for status in [401, 403, 429] {
            let input = ClassifierInput {
                status_code: Some(status),
                ..Default::default()
            };
            assert_eq!(classify(&input), Some(ErrorKind::Http4xxBlock));
        }
    }

    #[test]
    fn classifies_404_distinctly_from_other_4xx() {
        let input = ClassifierInput {
            status_code: Some(404),
            ..Default::default()
        };
        assert_eq!(classify(&input), Some(ErrorKind::NotFound404));
    }

    #[test]
    fn classifies_5xx() {
        let input = ClassifierInput {
            status_code: Some(502),
            ..Default::default()
        };
        assert_eq!(classify(&input), Some(ErrorKind::Http5xx));
    }

    #[test]
    fn redirect_loop_over_ten() {
        let input = ClassifierInput {
            redirect_count: 11,
            ..Default::default()
        };
        assert_eq!(classify(&input), Some(ErrorKind::RedirectLoop));

        let input_ok = ClassifierInput {
            redirect_count: 10,
            status_code: Some(200),
            ..Default::default()
        };
        assert_eq!(classify(&input_ok), None);
    }

    #[test]
    fn captcha_marker_detected_in_body() {
        let body = b"<html><body>Please verify you are human</body></html>";
        let input = ClassifierInput {
            status_code: Some(200),
            body: Some(body),
            ..Default::default()
        };
        assert_eq!(classify(&input), Some(ErrorKind::CaptchaDetected));
    }

    #[test]
    fn javascript_required_heuristic() {
        let body = b"<html><div id='root'></div></html>";
        let input = ClassifierInput {
            status_code: Some(200),
            body: Some(body),
            domain: "react.dev",
            has_article_or_main_tag: false,
            ..Default::default()
        };
        assert_eq!(classify(&input), Some(ErrorKind::JavascriptRequired));

        let with_main = ClassifierInput {
            has_article_or_main_tag: true,
            ..input
        };
        assert_eq!(classify(&with_main), None);
    }

    #[test]
    fn success_classifies_as_none() {
        let input = ClassifierInput {
            status_code: Some(200),
            body: Some(b"<html><article>plenty of content here</article></html>"),
            ..Default::default()
        };
        assert_eq!(classify(&input), None);
    }
}
