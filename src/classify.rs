use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DOLLAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[\d.,]+").unwrap());

const REJECT_PHRASES: &[&str] = &[
    "this course costs",
    "preview this course",
    "start free trial",
    "coursera plus",
    "subscribe",
];
const PAYMENT_CONTEXT_NEAR_DOLLAR: &[&str] = &[
    "cost",
    "costs",
    "per month",
    "month",
    "subscribe",
    "free trial",
    "trial",
];
/// Characters inspected on each side of a dollar amount.
const DOLLAR_WINDOW: usize = 50;

const FULL_COURSE_NO_CERT: &str = "full course, no certificate";
const ENROLL_FOR_FREE: &str = "enroll for free";
const NO_CERTIFICATE: &str = "no certificate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    TrulyFree,
    PaidOrPreview,
    Unknown,
}

impl Classification {
    pub const ALL: [Classification; 3] = [
        Classification::TrulyFree,
        Classification::PaidOrPreview,
        Classification::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::TrulyFree => "TRULY_FREE",
            Classification::PaidOrPreview => "PAID_OR_PREVIEW",
            Classification::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Classification::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown classification {s:?} (expected TRULY_FREE, PAID_OR_PREVIEW or UNKNOWN)")
            })
    }
}

/// A label plus the signals that produced it. Always replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub classification: Classification,
    pub reason: String,
}

impl Verdict {
    pub fn new(classification: Classification, reason: impl Into<String>) -> Self {
        Verdict {
            classification,
            reason: reason.into(),
        }
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Verdict::new(Classification::Unknown, reason)
    }
}

/// Guess whether a saved course page is truly free to audit.
///
/// Works on the whitespace-collapsed, lowercased raw HTML, markup included.
/// Any reject phrase or priced dollar amount makes the page PAID_OR_PREVIEW,
/// whatever free signals are also present.
pub fn classify(html: &str) -> Verdict {
    let text = WHITESPACE_RE.replace_all(html, " ").to_lowercase();

    let reject_hits: Vec<&str> = REJECT_PHRASES
        .iter()
        .copied()
        .filter(|phrase| text.contains(phrase))
        .collect();
    let dollar_hit = has_dollar_payment_signal(&text);

    if !reject_hits.is_empty() || dollar_hit {
        let mut reasons: Vec<String> = reject_hits
            .iter()
            .map(|p| format!("reject phrase: '{}'", p))
            .collect();
        if dollar_hit {
            reasons.push("payment pricing near '$' detected".to_string());
        }
        return Verdict::new(Classification::PaidOrPreview, reasons.join("; "));
    }

    if text.contains(FULL_COURSE_NO_CERT) {
        return Verdict::new(
            Classification::TrulyFree,
            "matched 'Full Course, No Certificate' and no reject phrases",
        );
    }
    if text.contains(ENROLL_FOR_FREE) && text.contains(NO_CERTIFICATE) {
        return Verdict::new(
            Classification::TrulyFree,
            "matched 'Enroll for free' + 'No Certificate' and no reject phrases",
        );
    }
    Verdict::unknown("insufficient signals for truly-free or paid/preview")
}

fn has_dollar_payment_signal(text: &str) -> bool {
    DOLLAR_RE.find_iter(text).any(|m| {
        let window = surrounding(text, m.start(), m.end());
        PAYMENT_CONTEXT_NEAR_DOLLAR
            .iter()
            .any(|term| window.contains(term))
    })
}

/// `DOLLAR_WINDOW` chars before `start` through `DOLLAR_WINDOW` chars after `end`.
fn surrounding(text: &str, start: usize, end: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(DOLLAR_WINDOW - 1)
        .map_or(0, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(DOLLAR_WINDOW)
        .map_or(text.len(), |(i, _)| end + i);
    &text[from..to]
}
