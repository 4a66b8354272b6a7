use serde::Serialize;
use std::fmt;
use std::io;
use std::str::FromStr;

/// Aggregate for one directory (or one file with leaf tracking) in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub path: String,
    pub name: String,
    /// Recursive sum of regular-file sizes beneath this path
    pub size: u64,
    pub file_count: u64,
    /// Subdirectories strictly beneath this path
    pub dir_count: u64,
    /// Distance from the mount root, root = 0
    pub depth: u32,
    /// None only at the mount root
    pub parent_path: Option<String>,
    pub is_dir: bool,
}

/// Classification of a traversal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorKind {
    PermissionDenied,
    NotFound,
    Io,
    /// Scan-ending condition (root inaccessible, storage failure, cancellation)
    Fatal,
}

impl ScanErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanErrorKind::PermissionDenied => "permission_denied",
            ScanErrorKind::NotFound => "not_found",
            ScanErrorKind::Io => "io",
            ScanErrorKind::Fatal => "fatal",
        }
    }
}

impl From<&io::Error> for ScanErrorKind {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::Io,
        }
    }
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanErrorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permission_denied" => Ok(ScanErrorKind::PermissionDenied),
            "not_found" => Ok(ScanErrorKind::NotFound),
            "io" => Ok(ScanErrorKind::Io),
            "fatal" => Ok(ScanErrorKind::Fatal),
            other => anyhow::bail!("unknown scan error kind: {other}"),
        }
    }
}

/// One traversal failure recorded against a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub path: String,
    pub kind: ScanErrorKind,
    pub message: String,
}

impl ScanError {
    pub fn new(path: impl Into<String>, kind: ScanErrorKind, message: impl Into<String>) -> Self {
        Self { path: path.into(), kind, message: message.into() }
    }

    pub fn from_io(path: impl Into<String>, err: &io::Error) -> Self {
        Self::new(path, ScanErrorKind::from(err), err.to_string())
    }
}
