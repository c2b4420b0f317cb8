// src/utils/text.rs

//! Text folding and HTML flattening.

use scraper::Html;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Fold text for case- and accent-insensitive matching.
///
/// Applies NFD decomposition, strips combining marks and lowercases, so
/// `"Híbrido"`, `"HIBRIDO"` and `"hibrido"` all fold to `"hibrido"`.
/// Patterns are folded the same way before compilation.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fold a regex source the way [`fold`] folds text.
///
/// Escape sequences are kept verbatim so `\S`, `\W` or `\D` keep their
/// meaning instead of being lowercased into their complements.
pub fn fold_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    for c in pattern.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            out.push(c);
            escaped = true;
        } else {
            out.push_str(&fold(&c.to_string()));
        }
    }
    out
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flatten an HTML fragment into plain text.
///
/// Some boards ship entity-escaped markup (`&lt;p&gt;`); after one pass the
/// decoded text still looks like markup, so it is parsed a second time.
pub fn html_to_text(html: &str) -> String {
    let first = flatten(html);
    let text = if looks_like_markup(&first) {
        flatten(&first)
    } else {
        first
    };
    normalize_whitespace(&text)
}

fn flatten(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
}

fn looks_like_markup(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('<') && trimmed.contains('>')
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents_and_case() {
        assert_eq!(fold("Híbrido"), "hibrido");
        assert_eq!(fold("ESCRITÓRIO"), "escritorio");
        assert_eq!(fold("São Paulo"), "sao paulo");
        assert_eq!(fold("Automação"), "automacao");
    }

    #[test]
    fn test_fold_is_idempotent() {
        let once = fold("Júnior Engenheiro de Dados");
        assert_eq!(fold(&once), once);
    }

    #[test]
    fn test_fold_pattern_keeps_escapes() {
        assert_eq!(fold_pattern(r"\bH[ÍI]BRIDO\b"), r"\bh[ii]brido\b");
        assert_eq!(fold_pattern(r"\S+\D"), r"\S+\D");
        assert_eq!(fold_pattern(r"escrit[óo]rio"), "escrit[oo]rio");
    }

    #[test]
    fn test_html_to_text_plain_markup() {
        let text = html_to_text("<p>Stack:</p><ul><li>Python</li><li>Spark</li></ul>");
        assert_eq!(text, "Stack: Python Spark");
    }

    #[test]
    fn test_html_to_text_escaped_markup() {
        let text = html_to_text("&lt;p&gt;100% remoto&lt;/p&gt;");
        assert_eq!(text, "100% remoto");
    }

    #[test]
    fn test_html_to_text_plain_text_untouched() {
        assert_eq!(html_to_text("Fully  remote\nrole"), "Fully remote role");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
