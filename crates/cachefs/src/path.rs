//! Validation of slash-separated store paths.

/// Reports whether `name` is a well-formed store path.
///
/// Valid paths are unrooted, slash-separated sequences of non-empty
/// elements, where no element is `.` or `..`. The single name `.` denotes
/// the root. Backslashes and other characters carry no special meaning.
pub fn is_valid(name: &str) -> bool {
    if name == "." {
        return true;
    }
    !name.is_empty()
        && name
            .split('/')
            .all(|element| !element.is_empty() && element != "." && element != "..")
}

/// Returns the last element of a valid path.
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Joins a directory path and a child name, treating `.` as the root.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "." {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_relative_paths() {
        for name in [".", "a", "a.txt", "a/b", "a/b/c.txt", "..a", "a..", "a\\b"] {
            assert!(is_valid(name), "{name:?} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_paths() {
        for name in ["", "/", "/a", "a/", "a//b", "./a", "a/.", "..", "a/../b", "a/./b"] {
            assert!(!is_valid(name), "{name:?} should be invalid");
        }
    }

    #[test]
    fn base_name_and_join() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("a"), "a");
        assert_eq!(base_name("."), ".");
        assert_eq!(join(".", "a"), "a");
        assert_eq!(join("a/b", "c"), "a/b/c");
    }
}
