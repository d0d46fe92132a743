//! String sanitation helpers shared by both pipelines.

/// Strip characters that are unsafe in file names and replace spaces with
/// underscores.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// Remove control characters and normalize whitespace.
///
/// Prompts assembled from LLM output routinely carry newlines and tabs that
/// break downstream consumers expecting a single line.
pub fn clean_string(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .filter(|c| !c.is_control())
        .collect();
    replaced.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d"), "abcd");
        assert_eq!(sanitize_filename("the wild river"), "the_wild_river");
        assert_eq!(sanitize_filename("what?*<>|\""), "what");
    }

    #[test]
    fn test_clean_string_strips_newlines() {
        assert_eq!(clean_string("a\nb\r\nc\td"), "a b  c d");
    }

    #[test]
    fn test_clean_string_trims() {
        assert_eq!(clean_string("  padded  "), "padded");
        assert_eq!(clean_string(""), "");
    }

    #[test]
    fn test_clean_string_keeps_non_ascii() {
        assert_eq!(clean_string("늑대가 강을 건넌다"), "늑대가 강을 건넌다");
    }
}
