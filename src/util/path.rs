use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Lexically normalizes an absolute path.
///
/// Removes `.` components, resolves `..` against the preceding component
/// and drops trailing separators. Symlinks are not consulted, so the result
/// is the path as the walker will see it, not its canonical target.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// True when `path` equals `prefix` or lies beneath it.
///
/// Matching is per path segment, so `/var` covers `/var/log` but not `/variant`.
pub fn is_within(path: &Path, prefix: &Path) -> bool {
    path.starts_with(prefix)
}

/// Lossy UTF-8 rendering used for every path stored in the database
pub fn path_key(path: &Path) -> Cow<'_, str> {
    path.to_string_lossy()
}

/// Display name of a path: its last segment, or the path itself at `/`
pub fn base_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}
