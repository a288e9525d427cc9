use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Accent, case and whitespace insensitive form used to match people by name.
pub(crate) fn normalize_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let stripped: String = cleaned.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let spaced = stripped.replace(['-', '\''], " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

pub(crate) fn names_match(left: &str, right: &str) -> bool {
    normalize_name(left) == normalize_name(right)
}
