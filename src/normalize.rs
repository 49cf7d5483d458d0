//! Structural normalization of identity fields.
//!
//! Nothing here decides whether a number or address actually exists; it only
//! folds the many ways sources write the same value into one canonical form so
//! records can be keyed and compared.

use regex::Regex;
use std::sync::LazyLock;

static NON_DIAL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\d+]").expect("static pattern compiles")
});

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static pattern compiles"));

/// Dialing rules used to canonicalize local numbers into E.164-like keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneRules {
    /// Country calling code without the leading `+` (e.g. `52`).
    pub country_code: String,
    /// Area code prepended to 8-digit local numbers (e.g. `55`).
    pub default_area_code: String,
}

impl Default for PhoneRules {
    fn default() -> Self {
        Self {
            country_code: "52".to_string(),
            default_area_code: "55".to_string(),
        }
    }
}

/// Normalize a raw phone string into a business key (`+<cc><number>`).
///
/// Returns `None` when the input is empty or too short to be a number.
///
/// - `+52 55 1111 2222` → `+525511112222`
/// - `5511112222` → `+525511112222`
/// - `11112222` → `+525511112222` (default area code)
pub fn normalize_phone(raw: &str, rules: &PhoneRules) -> Option<String> {
    let cleaned = NON_DIAL_CHARS.replace_all(raw.trim(), "");
    if cleaned.len() < 7 {
        return None;
    }

    let plus_prefix = format!("+{}", rules.country_code);
    let number: String = if let Some(rest) = cleaned.strip_prefix(plus_prefix.as_str()) {
        rest.to_string()
    } else if cleaned.starts_with(rules.country_code.as_str()) && cleaned.len() >= 12 {
        cleaned[rules.country_code.len()..].to_string()
    } else {
        cleaned.trim_start_matches('0').to_string()
    };
    // A stray '+' left after stripping a foreign prefix is not a digit.
    let number: String = number.chars().filter(|c| c.is_ascii_digit()).collect();

    let cc = &rules.country_code;
    match number.len() {
        10 => Some(format!("+{}{}", cc, number)),
        8 => Some(format!("+{}{}{}", cc, rules.default_area_code, number)),
        n if n > 10 => Some(format!("+{}{}", cc, &number[n - 10..])),
        n if n >= 7 => Some(format!("+{}{}", cc, number)),
        _ => None,
    }
}

/// Canonical form of a display name used as the secondary identity signal:
/// trimmed, inner whitespace collapsed, lowercased.
pub fn normalize_name(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE_RUNS.replace_all(raw.trim(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

/// Trim and lowercase an email; values without an `@` are discarded.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() < 3 || !trimmed.contains('@') {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Trim a free-text field, mapping blank values to `None`.
pub fn clean_text(raw: Option<String>) -> Option<String> {
    raw.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == value.len() {
            Some(value)
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Digits only, as expected by dial-style endpoints.
pub fn dial_digits(key: &str) -> String {
    key.chars().filter(|c| c.is_ascii_digit()).collect()
}
