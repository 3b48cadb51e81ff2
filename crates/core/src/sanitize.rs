use crate::config::Replacement;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Drops a single trailing character when it is not a letter or digit.
pub fn trim_trailing_symbol(value: &str) -> &str {
    match value.chars().next_back() {
        Some(last) if !last.is_alphanumeric() => &value[..value.len() - last.len_utf8()],
        _ => value,
    }
}

/// Literal substring replacement, applied in list order.
pub fn apply_replacements(mut value: String, table: &[Replacement]) -> String {
    for replacement in table {
        if replacement.find.is_empty() || !value.contains(&replacement.find) {
            continue;
        }
        value = value.replace(&replacement.find, &replacement.with);
    }
    value
}

pub fn strip_diacritics(value: &str) -> String {
    value
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .nfc()
        .collect()
}

pub fn remove_control_chars(value: &str) -> String {
    value.chars().filter(|ch| !ch.is_control()).collect()
}

/// Turns every whitespace run into a single space.
pub fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            prev_space = false;
            out.push(ch);
        }
    }

    out
}

pub fn normalize_text(value: &str) -> String {
    collapse_whitespace(&remove_control_chars(&strip_diacritics(value)))
}
