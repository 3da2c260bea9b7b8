use regex::Regex;

/// Compiles a glob-like name pattern: `*` matches any run of characters,
/// `?` a single character, everything else literally. Case-insensitive.
pub fn compile_name_pattern(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

pub fn matches_name_pattern(pattern: &str, name: &str) -> bool {
    compile_name_pattern(pattern)
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Substring after the last `.`, lowercased. Dotfiles and names without a dot
/// have no extension.
pub fn file_extension(name: &str) -> Option<String> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 < name.len() => Some(name[idx + 1..].to_ascii_lowercase()),
        Some(_) => None,
    }
}

/// Lowercases and strips a leading dot so `".TXT"` and `"txt"` compare equal.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
