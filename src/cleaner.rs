// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Reference Cleaner.
//!
//! A pure pipeline of small named passes over one raw reference string,
//! each one independently unit-testable without touching the filesystem.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum NumberingStyle {
    /// `[N]`, `(N)`, or `[short-label]`.
    Bracketed,
    /// `N<non-word>`.
    Numeric,
    /// No recognizable leading numbering.
    None,
}

struct Patterns {
    whitespace: Regex,
    hyphen_spacing: Regex,
    bracketed_digits: Regex,
    bracketed_label: Regex,
    numeric_prefix: Regex,
    style2_redundant: Regex,
    style1_pair: Regex,
    style0_digits: Regex,
    backslash_quote: Regex,
    comma_space: Regex,
}

fn patterns() -> &'static Patterns {
    static P: OnceLock<Patterns> = OnceLock::new();
    P.get_or_init(|| Patterns {
        whitespace: Regex::new(r"\s+").unwrap(),
        hyphen_spacing: Regex::new(r"\s*-\s*").unwrap(),
        bracketed_digits: Regex::new(r"^[\[(]\d+[])]").unwrap(),
        bracketed_label: Regex::new(r"^\[[A-Za-z][\w.+-]{0,15}\]").unwrap(),
        numeric_prefix: Regex::new(r"^\d+\W").unwrap(),
        style2_redundant: Regex::new(r"^\d+\s*(\[\w+\])").unwrap(),
        style1_pair: Regex::new(r"^\d+\s+\d+\s*").unwrap(),
        style0_digits: Regex::new(r"^\d+([A-Za-z])").unwrap(),
        backslash_quote: Regex::new(r#"\\([A-Z]\w*)""#).unwrap(),
        comma_space: Regex::new(r",\s*,").unwrap(),
        })
}

/// Run the full cleaning pipeline on one raw reference string.
pub fn clean_reference(raw: &str, title: Option<&str>) -> String {
    let s = trim_and_collapse(raw);
    let s = strip_title(&s, title);
    let style = classify_numbering_style(&s);
    let s = normalize_hyphen_spacing(&s);
    let s = strip_leading_numbering(&s, style);
    let s = repair_backslash_quote(&s);
    final_tidy(&s)
}

fn trim_and_collapse(raw: &str) -> String {
    patterns().whitespace.replace_all(raw.trim(), " ").into_owned()
}

fn strip_title(s: &str, title: Option<&str>) -> String {
    let Some(title) = title else { return s.to_string() };
    if title.is_empty() {
        return s.to_string();
    }

    if let Some(pos) = s.find(title) {
        let end = pos + title.len();
        let mut tail_end = end;
        let bytes = s.as_bytes();
        if tail_end < bytes.len() && bytes[tail_end].is_ascii_digit() {
            tail_end += 1;
        }
        let mut out = String::with_capacity(s.len());
        out.push_str(&s[..pos]);
        out.push_str(&s[tail_end..]);
        out
    } else {
        s.to_string()
    }
}

fn classify_numbering_style(s: &str) -> NumberingStyle {
    let p = patterns();
    if p.bracketed_digits.is_match(s) || p.bracketed_label.is_match(s) {
        NumberingStyle::Bracketed
    } else if p.numeric_prefix.is_match(s) {
        NumberingStyle::Numeric
    } else {
        NumberingStyle::None
    }
}

fn normalize_hyphen_spacing(s: &str) -> String {
    patterns().hyphen_spacing.replace_all(s, "-").into_owned()
}

fn strip_leading_numbering(s: &str, style: NumberingStyle) -> String {
    let p = patterns();
    match style {
        NumberingStyle::Bracketed => p.style2_redundant.replace(s, "$1").trim_start().to_string(),
        NumberingStyle::Numeric => p.style1_pair.replace(s, "").to_string(),
        NumberingStyle::None => p.style0_digits.replace(s, "$1").to_string(),
    }
}

fn repair_backslash_quote(s: &str) -> String {
    patterns()
        .backslash_quote
        .replace_all(s, "\"$1\"")
        .into_owned()
}

fn final_tidy(s: &str) -> String {
    let s = patterns().comma_space.replace_all(s, ",");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(trim_and_collapse("  a   b\tc\n"), "a b c");
    }

    #[test]
    fn strips_title_occurrence() {
        let s = strip_title("Smith, J. 2001, The Big Survey2, ApJ", Some("The Big Survey"));
        assert_eq!(s, "Smith, J. 2001, , ApJ");
    }

    #[test]
    fn classifies_bracketed_numbering() {
        assert_eq!(classify_numbering_style("[12] Smith"), NumberingStyle::Bracketed);
        assert_eq!(classify_numbering_style("(3) Jones"), NumberingStyle::Bracketed);
        assert_eq!(classify_numbering_style("[AB01] Jones"), NumberingStyle::Bracketed);
    }

    #[test]
    fn classifies_numeric_prefix() {
        assert_eq!(classify_numbering_style("12. Smith"), NumberingStyle::Numeric);
    }

    #[test]
    fn classifies_none() {
        assert_eq!(classify_numbering_style("Smith, J."), NumberingStyle::None);
    }

    #[test]
    fn hyphen_spacing_is_tightened() {
        assert_eq!(normalize_hyphen_spacing("astro - ph"), "astro-ph");
    }

    #[test]
    fn strips_style1_numeric_pair() {
        assert_eq!(strip_leading_numbering("12 5 Smith, J.", NumberingStyle::Numeric), "Smith, J.");
    }

    #[test]
    fn strips_style0_leading_digit() {
        assert_eq!(strip_leading_numbering("1Smith, J.", NumberingStyle::None), "Smith, J.");
    }

    #[test]
    fn repairs_backslash_quote_artifact() {
        assert_eq!(repair_backslash_quote(r#"\Xfoo" bar"#), "\"Xfoo\" bar");
    }

    #[test]
    fn full_pipeline_on_a_realistic_reference() {
        let cleaned = clean_reference(
            "[1]  Smith, J.  2001,   The Big Survey2, ApJ, 1, 1",
            Some("The Big Survey"),
        );
        assert_eq!(cleaned, "Smith, J. 2001, , ApJ, 1, 1");
    }
}
