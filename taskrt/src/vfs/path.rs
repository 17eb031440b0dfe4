//! Path normalization: absolute, `/`-separated, no `.`/`..`/empty segments.

/// A normalized, absolute path split into its component segments. The
/// root path has zero segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsPath {
    segments: Vec<String>,
}

impl VfsPath {
    /// Parses `raw` into a normalized path. Relative segments (`.`) are
    /// dropped; `..` is rejected outright rather than resolved, since the
    /// tree has no notion of a "current directory" to escape from.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if !raw.starts_with('/') {
            return Err(format!("path must be absolute: {}", raw));
        }
        let mut segments = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => continue,
                ".." => return Err(format!("path may not contain '..': {}", raw)),
                other => segments.push(other.to_string()),
            }
        }
        Ok(VfsPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn join(&self, child: &str) -> VfsPath {
        let mut segments = self.segments.clone();
        segments.push(child.to_string());
        VfsPath { segments }
    }

    pub fn to_string_lossy(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl std::fmt::Display for VfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dots_and_slashes() {
        let p = VfsPath::parse("/a//./b/").unwrap();
        assert_eq!(p.segments(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rejects_dotdot() {
        assert!(VfsPath::parse("/a/../b").is_err());
    }

    #[test]
    fn root_has_no_segments() {
        assert!(VfsPath::parse("/").unwrap().is_root());
    }
}
