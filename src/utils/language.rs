use once_cell::sync::Lazy;
use regex::Regex;
use whatlang::{detect, Lang, Script};

const MIN_ALPHA_CHARS: usize = 2;
const LATIN_CONFIDENCE_THRESHOLD: f64 = 0.68;
const NON_LATIN_CONFIDENCE_THRESHOLD: f64 = 0.5;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid url regex"));
static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)@[a-z0-9_]{3,}").expect("valid mention regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

fn normalize_text_for_detection(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, " ");
    let without_mentions = MENTION_RE.replace_all(&without_urls, " ");
    WHITESPACE_RE
        .replace_all(&without_mentions, " ")
        .trim()
        .to_string()
}

fn alphabetic_char_count(text: &str) -> usize {
    text.chars().filter(|ch| ch.is_alphabetic()).count()
}

fn detect_lang(text: &str) -> Option<Lang> {
    let normalized = normalize_text_for_detection(text);
    if normalized.is_empty() || alphabetic_char_count(&normalized) < MIN_ALPHA_CHARS {
        return None;
    }

    let info = detect(&normalized)?;
    if info.is_reliable() {
        return Some(info.lang());
    }

    let threshold = match info.script() {
        Script::Latin => LATIN_CONFIDENCE_THRESHOLD,
        _ => NON_LATIN_CONFIDENCE_THRESHOLD,
    };
    if info.confidence() >= threshold {
        return Some(info.lang());
    }

    None
}

pub fn detect_language_name(text: &str) -> Option<String> {
    detect_lang(text).map(|lang| lang.eng_name().to_string())
}

/// Splits a message into its URLs and the remaining prose.
pub fn split_urls(text: &str) -> (Vec<String>, String) {
    let urls = URL_RE
        .find_iter(text)
        .map(|found| {
            found
                .as_str()
                .trim_end_matches(|ch: char| matches!(ch, ')' | ']' | '>' | ',' | '.' | '，' | '。'))
                .to_string()
        })
        .collect::<Vec<_>>();
    let remainder = URL_RE.replace_all(text, " ");
    let remainder = WHITESPACE_RE.replace_all(remainder.trim(), " ").to_string();
    (urls, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_sentence_has_a_language() {
        assert!(detect_language_name(
            "極簡主義的力量在於克制與留白，讓每一個元素都有呼吸的空間。"
        )
        .is_some());
    }

    #[test]
    fn too_short_text_has_no_language() {
        assert_eq!(detect_language_name("12345"), None);
        assert_eq!(detect_language_name("https://example.com/a"), None);
    }

    #[test]
    fn urls_are_split_from_prose() {
        let (urls, rest) =
            split_urls("看看这个 https://www.youtube.com/watch?v=abc123, 很有意思");
        assert_eq!(urls, vec!["https://www.youtube.com/watch?v=abc123".to_string()]);
        assert_eq!(rest, "看看这个 很有意思");
    }

    #[test]
    fn text_without_urls_is_untouched() {
        let (urls, rest) = split_urls("  minimalism  ");
        assert!(urls.is_empty());
        assert_eq!(rest, "minimalism");
    }
}
