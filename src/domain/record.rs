//! Field extraction over loosely-typed upstream records
//!
//! Upstream services (accounting backend, reverse geocoders) are inconsistent
//! about field naming. A `FieldChain` is an ordered list of candidate keys;
//! the first key holding a usable value wins.

use serde_json::{Map, Value};

/// Normalized record: a JSON object from an upstream response
pub type Record = Map<String, Value>;

/// Ordered list of candidate field names for one logical field
#[derive(Debug, Clone, Copy)]
pub struct FieldChain {
    keys: &'static [&'static str],
}

impl FieldChain {
    pub const fn new(keys: &'static [&'static str]) -> Self {
        Self { keys }
    }

    /// First non-empty text value. Numbers are rendered as text.
    pub fn text(&self, record: &Record) -> Option<String> {
        self.keys.iter().find_map(|key| match record.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// First present numeric value. Numeric strings are parsed; a present but
    /// unparsable value yields 0.
    pub fn number(&self, record: &Record) -> Option<f64> {
        self.keys.iter().find_map(|key| match record.get(*key)? {
            Value::Null => None,
            Value::Number(n) => Some(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Some(parse_number(s).unwrap_or(0.0)),
            _ => Some(0.0),
        })
    }

    /// First non-empty value that is either a string or an array of strings
    /// (joined with `", "`)
    pub fn joined_text(&self, record: &Record) -> Option<String> {
        self.keys.iter().find_map(|key| match record.get(*key)? {
            Value::Array(items) => {
                let parts: Vec<&str> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
    }
}

/// Parse a user- or backend-supplied numeric string. Empty and non-finite
/// values are rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Join parts with `", "`, dropping blanks and repeated tokens while keeping
/// first-seen order
pub fn join_unique<'a, I>(parts: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut seen: smallvec::SmallVec<[&str; 4]> = smallvec::SmallVec::new();
    for part in parts.into_iter().flatten() {
        let part = part.trim();
        if !part.is_empty() && !seen.contains(&part) {
            seen.push(part);
        }
    }
    (!seen.is_empty()).then(|| seen.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    const NAME: FieldChain = FieldChain::new(&["$Name", "MailingName", "Name"]);

    #[test]
    fn test_text_first_present_wins() {
        let r = record(json!({ "Name": "Plain", "MailingName": "Mailing" }));
        assert_eq!(NAME.text(&r).as_deref(), Some("Mailing"));

        let r = record(json!({ "$Name": "  ", "Name": "Plain" }));
        assert_eq!(NAME.text(&r).as_deref(), Some("Plain"));

        assert_eq!(NAME.text(&record(json!({}))), None);
    }

    #[test]
    fn test_number_parses_strings() {
        let chain = FieldChain::new(&["$ClosingBalance", "ClosingBalance"]);
        assert_eq!(chain.number(&record(json!({ "ClosingBalance": "-250.5" }))), Some(-250.5));
        assert_eq!(chain.number(&record(json!({ "$ClosingBalance": 12 }))), Some(12.0));
        assert_eq!(chain.number(&record(json!({ "ClosingBalance": "n/a" }))), Some(0.0));
        assert_eq!(chain.number(&record(json!({ "$ClosingBalance": null }))), None);
    }

    #[test]
    fn test_joined_text_array() {
        let chain = FieldChain::new(&["$Address", "Address"]);
        let r = record(json!({ "Address": ["Main Rd", "", "Tirur"] }));
        assert_eq!(chain.joined_text(&r).as_deref(), Some("Main Rd, Tirur"));
    }

    #[test]
    fn test_join_unique() {
        assert_eq!(
            join_unique([Some("Bazaar"), Some("Bazaar"), Some(" Tirur "), None]).as_deref(),
            Some("Bazaar, Tirur")
        );
        assert_eq!(join_unique([None, Some("  ")]), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 100 "), Some(100.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
    }
}
