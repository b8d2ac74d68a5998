//! The transform pipeline (spec §4.6 "Transform pipeline"): named pure
//! functions applied left-to-right to a raw extracted string.

use serde::{Deserialize, Serialize};
use url::Url;

/// One transform step. `LimitLength` carries its `N` parameter; the rest
/// are parameterless. Deserialized from the compact wire forms used in
/// template YAML (`strip`, `collapse_whitespace`, `extract_date`,
/// `absolutize_url`, `limit_length:N`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Transform {
    Strip,
    CollapseWhitespace,
    ExtractDate,
    AbsolutizeUrl,
    LimitLength(usize),
}

impl TryFrom<String> for Transform {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.as_str() {
            "strip" => Ok(Transform::Strip),
            "collapse_whitespace" => Ok(Transform::CollapseWhitespace),
            "extract_date" => Ok(Transform::ExtractDate),
            "absolutize_url" => Ok(Transform::AbsolutizeUrl),
            _ => {
                if let Some(n) = raw.strip_prefix("limit_length:") {
                    let n: usize = n
                        .parse()
                        .map_err(|_| format!("limit_length: expects an integer, got {n:?}"))?;
                    Ok(Transform::LimitLength(n))
                } else {
                    Err(format!("unknown transform {raw:?}"))
                }
            }
        }
    }
}

impl From<Transform> for String {
    fn from(t: Transform) -> String {
        match t {
            Transform::Strip => "strip".to_string(),
            Transform::CollapseWhitespace => "collapse_whitespace".to_string(),
            Transform::ExtractDate => "extract_date".to_string(),
            Transform::AbsolutizeUrl => "absolutize_url".to_string(),
            Transform::LimitLength(n) => format!("limit_length:{n}"),
        }
    }
}

/// Outcome of running a field's transform pipeline: the resulting string,
/// plus any `raw_metadata` flags the pipeline wants recorded (e.g.
/// `date_parse_failed`).
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub value: String,
    pub flags: Vec<(String, String)>,
}

pub fn apply_pipeline(raw: &str, transforms: &[Transform], base_url: &str) -> TransformOutcome {
    let mut value = raw.to_string();
    let mut flags = Vec::new();

    for t in transforms {
        match t {
            Transform::Strip => value = value.trim().to_string(),
            Transform::CollapseWhitespace => value = collapse_whitespace(&value),
            Transform::ExtractDate => match extract_date(&value) {
                Some(normalized) => value = normalized,
                None => flags.push(("date_parse_failed".to_string(), value.clone())),
            },
            Transform::AbsolutizeUrl => {
                if let Some(absolute) = absolutize(&value, base_url) {
                    value = absolute;
                }
            }
            Transform::LimitLength(n) => value = limit_length(&value, *n),
        }
    }

    TransformOutcome { value, flags }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

pub fn absolutize(value: &str, base_url: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    base.join(value).ok().map(|u| u.to_string())
}

pub fn limit_length(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        return s.to_string();
    }
    let truncated: String = s.chars().take(n).collect();
    format!("{truncated}…")
}

/// Parse common date strings into `YYYY-MM-DD`. Tries, in order: ISO 8601
/// (via chrono's RFC3339/`NaiveDate` parsing), `YYYY-MM-DD`, `MM/DD/YYYY`,
/// `YYYY年MM月DD日`, and the MediaWiki "本页面最后修订于 ... (UTC+8)" footer form.
pub fn extract_date(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Some(d.format("%Y-%m-%d").to_string());
    }

    if let Some(d) = parse_chinese_date(raw) {
        return Some(d);
    }

    if let Some(d) = parse_mediawiki_revision_footer(raw) {
        return Some(d);
    }

    None
}

/// `YYYY年MM月DD日`.
fn parse_chinese_date(raw: &str) -> Option<String> {
    let year_idx = raw.find('年')?;
    let month_idx = raw.find('月')?;
    let day_idx = raw.find('日')?;
    if !(year_idx < month_idx && month_idx < day_idx) {
        return None;
    }
    let year: i32 = raw[..year_idx].trim().parse().ok()?;
    let month: u32 = raw[year_idx + '年'.len_utf8()..month_idx].trim().parse().ok()?;
    let day: u32 = raw[month_idx + '月'.len_utf8()..day_idx].trim().parse().ok()?;
    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Wikipedia-style footer: "本页面最后修订于2024年3月1日 (星期五) 08:00 (UTC+8)".
/// Reuses the Chinese-date parser on the substring up to and including the
/// day marker.
fn parse_mediawiki_revision_footer(raw: &str) -> Option<String> {
    if !raw.contains("修订于") {
        return None;
    }
    let day_idx = raw.find('日')?;
    let start = raw.find("修订于")? + "修订于".len();
    if start >= day_idx {
        return None;
    }
    parse_chinese_date(&raw[start..=day_idx])
}
