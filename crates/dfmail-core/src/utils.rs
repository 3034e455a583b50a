//! Common utility functions

/// Mask sensitive data for logging
pub fn mask_sensitive(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "***".to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

/// Last path component of a slash-separated path or URL path.
///
/// Trailing slashes are ignored; returns `None` for an empty result.
pub fn basename(path: &str) -> Option<&str> {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("short"), "***");
        assert_eq!(mask_sensitive("key-1234567890abcd"), "key-***abcd");
    }

    #[test]
    fn test_mask_sensitive_multibyte() {
        assert_eq!(mask_sensitive("ééééééééé"), "éééé***éééé");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("docs/report.pdf"), Some("report.pdf"));
        assert_eq!(basename("report.pdf"), Some("report.pdf"));
        assert_eq!(basename("dir/sub/"), Some("sub"));
        assert_eq!(basename("C:\\files\\a.txt"), Some("a.txt"));
        assert_eq!(basename(""), None);
        assert_eq!(basename("/"), None);
    }
}
