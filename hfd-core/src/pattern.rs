// SPDX-License-Identifier: MIT
//! Include/exclude pattern matching against plan item relative paths.
//!
//! A pattern matches a relative path when, case-insensitively: it equals
//! the path, it equals any path segment, it is a substring of the path, or
//! it is a glob (`*`, `?`) matched against the full path.

/// Does `pattern` match `path`, per the rules above?
pub fn matches(pattern: &str, path: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let path_lower = path.to_ascii_lowercase();

    if pattern == path_lower {
        return true;
    }
    if path_lower.split('/').any(|segment| segment == pattern) {
        return true;
    }
    if is_glob(&pattern) {
        return glob_match(&pattern, &path_lower);
    }
    path_lower.contains(&pattern)
}

/// A relative path is kept iff (include is empty OR some include pattern
/// matches) AND no exclude pattern matches. Exclusion overrides inclusion.
pub fn is_kept(path: &str, include: &[String], exclude: &[String]) -> bool {
    let included = include.is_empty() || include.iter().any(|p| matches(p, path));
    let excluded = exclude.iter().any(|p| matches(p, path));
    included && !excluded
}

/// Which single include pattern, if any, uniquely matched — used to derive
/// the `append_filter_subdir` name.
pub fn sole_matching_include<'a>(path: &str, include: &'a [String]) -> Option<&'a str> {
    if include.len() == 1 && matches(&include[0], path) {
        Some(include[0].as_str())
    } else {
        None
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Minimal `*`/`?` glob matcher against a full string, no path-segment
/// awareness (the pattern syntax in spec.md §6 matches against the full
/// path, not per-segment).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_inner(&p, &t)
}

fn glob_match_inner(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => {
            glob_match_inner(&p[1..], t)
                || (!t.is_empty() && glob_match_inner(p, &t[1..]))
        }
        Some('?') => !t.is_empty() && glob_match_inner(&p[1..], &t[1..]),
        Some(c) => t.first() == Some(c) && glob_match_inner(&p[1..], &t[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("config.json", "config.json"));
    }

    #[test]
    fn segment_match() {
        assert!(matches("onnx", "model/onnx/weights.bin"));
    }

    #[test]
    fn substring_match() {
        assert!(matches("safetensors", "model-00001-of-00002.safetensors"));
    }

    #[test]
    fn case_insensitive() {
        assert!(matches("CONFIG.JSON", "config.json"));
    }

    #[test]
    fn glob_star_and_question_mark() {
        assert!(matches("*.safetensors", "model-00001.safetensors"));
        assert!(matches("model-0000?.bin", "model-00001.bin"));
        assert!(!matches("model-0000?.bin", "model-000012.bin"));
    }

    #[test]
    fn exclusion_overrides_inclusion() {
        assert!(!is_kept(
            "model.onnx",
            &["*.onnx".to_string()],
            &["model.onnx".to_string()]
        ));
    }

    #[test]
    fn empty_include_keeps_everything_not_excluded() {
        assert!(is_kept("README.md", &[], &[]));
        assert!(!is_kept("README.md", &[], &["readme".to_string()]));
    }

    #[test]
    fn sole_include_is_reported() {
        let include = vec!["*.gguf".to_string()];
        assert_eq!(
            sole_matching_include("model.gguf", &include),
            Some("*.gguf")
        );
        let multi = vec!["*.gguf".to_string(), "*.bin".to_string()];
        assert_eq!(sole_matching_include("model.gguf", &multi), None);
    }
}
