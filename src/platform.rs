//! Host operating system detection.
use std::fmt;

/// Detected operating system platform.
///
/// Config descriptors name platforms with the lowercase form (`"linux"`,
/// `"mac"`, ...), which is also what [`fmt::Display`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Any Linux distribution.
    Linux,
    /// macOS.
    Mac,
    /// Windows.
    Windows,
    /// A host this tool does not recognise.
    Unknown,
}

impl Os {
    /// Detect the operating system of the running host.
    ///
    /// Never fails: platforms other than Linux, macOS and Windows map to
    /// [`Os::Unknown`].
    #[must_use]
    pub fn discover() -> Self {
        Self::from_target(std::env::consts::OS)
    }

    /// Map a Rust target OS name (as in [`std::env::consts::OS`]) to an [`Os`].
    #[must_use]
    pub fn from_target(name: &str) -> Self {
        match name {
            "linux" => Self::Linux,
            "macos" => Self::Mac,
            "windows" => Self::Windows,
            _ => Self::Unknown,
        }
    }

    /// Parse a platform name as written in a descriptor.
    ///
    /// Accepts the [`key`](Self::key) forms plus `macos` and `darwin`,
    /// ignoring ASCII case. Returns `None` for any other name.
    #[must_use]
    pub fn from_key(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "mac" | "macos" | "darwin" => Some(Self::Mac),
            "windows" => Some(Self::Windows),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Key used for this OS in the `[defaults]` table of `packages.toml`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Mac => "mac",
            Self::Windows => "windows",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this host is POSIX-like (user ids, `sh`, `which` semantics).
    #[must_use]
    pub const fn is_unix(self) -> bool {
        matches!(self, Self::Linux | Self::Mac)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
