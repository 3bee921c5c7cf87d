
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"\p{Han}|[A-Za-z0-9]+").expect("token pattern is valid");
}


#[inline]
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}


#[inline]
pub fn safe_truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}


/// Each Han character is its own token; ASCII alphanumeric runs become
/// lowercased words. Everything else is a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_ascii() {
        assert_eq!(safe_truncate("hello world", 5), "hello");
    }

    #[test]
    fn test_safe_truncate_han() {
        assert_eq!(safe_truncate("紫微星在命宫", 2), "紫微");
    }

    #[test]
    fn test_safe_truncate_mixed() {
        assert_eq!(safe_truncate("Ziwei 紫微斗数", 8), "Ziwei 紫微");
    }

    #[test]
    fn test_safe_truncate_shorter() {
        assert_eq!(safe_truncate("五行", 10), "五行");
    }

    #[test]
    fn test_safe_truncate_ellipsis() {
        assert_eq!(safe_truncate_ellipsis("天干地支", 2), "天干...");
        assert_eq!(safe_truncate_ellipsis("hi", 10), "hi");
    }

    #[test]
    fn test_tokenize_mixed_script() {
        assert_eq!(tokenize("紫微 Star-42!"), vec!["紫", "微", "star", "42"]);
        assert!(tokenize("？！ ,").is_empty());
    }
}
