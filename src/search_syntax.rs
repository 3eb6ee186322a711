//! Gmail-style search query parsing (`from:alice subject:"q3 report" has:attachment`)

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedQuery {
    /// Free text terms, lowercased
    pub terms: Vec<String>,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub subject: Vec<String>,
    pub labels: Vec<String>,
    pub has_attachment: bool,
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self == &ParsedQuery::default()
    }
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // operator:"quoted value" | operator:value | "quoted phrase" | bare word
        Regex::new(r#"(?P<op>[A-Za-z]+):(?:"(?P<qv>[^"]*)"|(?P<v>\S+))|"(?P<phrase>[^"]*)"|(?P<word>\S+)"#)
            .expect("search token pattern is valid")
    })
}

/// Parses a search box query. Unknown operators are treated as free text.
pub fn parse(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();

    for caps in token_re().captures_iter(query) {
        if let Some(op) = caps.name("op") {
            let value = caps
                .name("qv")
                .or_else(|| caps.name("v"))
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            match op.as_str().to_lowercase().as_str() {
                "from" => parsed.from.push(value),
                "to" => parsed.to.push(value),
                "subject" => parsed.subject.push(value),
                "label" | "l" => parsed.labels.push(value),
                "has" if value == "attachment" => parsed.has_attachment = true,
                "after" => parsed.after = NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok(),
                "before" => parsed.before = NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok(),
                _ => parsed.terms.push(caps[0].to_lowercase()),
            }
        } else if let Some(phrase) = caps.name("phrase") {
            let phrase = phrase.as_str().trim().to_lowercase();
            if !phrase.is_empty() {
                parsed.terms.push(phrase);
            }
        } else if let Some(word) = caps.name("word") {
            parsed.terms.push(word.as_str().to_lowercase());
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_text() {
        let parsed = parse("Quarterly Report");
        assert_eq!(parsed.terms, vec!["quarterly", "report"]);
        assert!(parsed.from.is_empty());
    }

    #[test]
    fn test_parse_operators() {
        let parsed = parse("from:alice@example.com label:INBOX has:attachment invoice");
        assert_eq!(parsed.from, vec!["alice@example.com"]);
        assert_eq!(parsed.labels, vec!["inbox"]);
        assert!(parsed.has_attachment);
        assert_eq!(parsed.terms, vec!["invoice"]);
    }

    #[test]
    fn test_parse_quoted_values() {
        let parsed = parse(r#"subject:"q3 report" "exact phrase""#);
        assert_eq!(parsed.subject, vec!["q3 report"]);
        assert_eq!(parsed.terms, vec!["exact phrase"]);
    }

    #[test]
    fn test_parse_dates() {
        let parsed = parse("after:2024-01-01 before:2024-02-01");
        assert_eq!(parsed.after, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parsed.before, NaiveDate::from_ymd_opt(2024, 2, 1));
    }

    #[test]
    fn test_unknown_operator_is_free_text() {
        let parsed = parse("http://example.com");
        assert_eq!(parsed.terms, vec!["http://example.com"]);
    }

    #[test]
    fn test_empty_query() {
        assert!(parse("   ").is_empty());
    }
}
