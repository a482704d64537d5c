//! Helpers for remote paths. Remote paths are always POSIX, independent of
//! the local platform, so `std::path` is not used for them.

/// Returns the directory containing `path`, like `dirname(1)`.
///
/// `"/a/b"` gives `"/a"`, `"/a"` gives `"/"`, `"a"` gives `"."`. The root
/// is its own parent.
pub fn parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." }.to_owned();
    }

    match trimmed.rfind('/') {
        None => ".".to_owned(),
        Some(index) => {
            let dir = trimmed[..index].trim_end_matches('/');
            if dir.is_empty() { "/" } else { dir }.to_owned()
        }
    }
}

/// Appends `name` to `dir` with a single separator.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::{join, parent};

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent("/a/b/c"), "/a/b");
        assert_eq!(parent("/a/b/"), "/a");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(parent("//a//b"), "//a");
        assert_eq!(parent("a/b"), "a");
        assert_eq!(parent("a"), ".");
        assert_eq!(parent(""), ".");
    }

    #[test]
    fn join_paths() {
        assert_eq!(join("/upload", "file.txt"), "/upload/file.txt");
        assert_eq!(join("/", "etc"), "/etc");
        assert_eq!(join("upload/", "x"), "upload/x");
        assert_eq!(join("", "x"), "x");
    }
}
