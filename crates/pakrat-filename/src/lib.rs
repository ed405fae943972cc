pub use filekey::{normalize_filekey, FilekeyError, PypiFilekey};
pub use npm::{NpmPathError, NpmTarballPath};
pub use source_dist::{SourceDistExtension, SourceDistFilename, SourceDistFilenameError};
pub use wheel::{WheelFilename, WheelFilenameError};

mod filekey;
mod npm;
mod source_dist;
mod wheel;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The registry flavor the proxy is mirroring. Selects the route set, the
/// filekey rule, and the storage path layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    Pypi,
    Npm,
}

impl RegistryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pypi => "pypi",
            Self::Npm => "npm",
        }
    }
}

impl FromStr for RegistryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pypi" => Ok(Self::Pypi),
            "npm" => Ok(Self::Npm),
            other => Err(format!("unknown package type: {other}")),
        }
    }
}

impl Display for RegistryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a PyPI project name per the simple-API rules: lowercase, with
/// runs of `-`, `_` and `.` collapsed to a single `-`.
pub fn normalize_project_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            prev_sep = true;
        } else {
            if prev_sep && !out.is_empty() {
                out.push('-');
            }
            prev_sep = false;
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

/// Either kind of distribution artifact a PyPI index links to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistFilename {
    Wheel(WheelFilename),
    SourceDist(SourceDistFilename),
}

impl DistFilename {
    /// Parse a filename as a wheel or a source distribution, based on its
    /// extension.
    pub fn parse(filename: &str) -> Result<Self, FilenameError> {
        if filename.ends_with(".whl") {
            Ok(Self::Wheel(WheelFilename::from_str(filename)?))
        } else {
            Ok(Self::SourceDist(SourceDistFilename::parse(filename)?))
        }
    }

    /// The normalized project name.
    pub fn name(&self) -> &str {
        match self {
            Self::Wheel(wheel) => &wheel.name,
            Self::SourceDist(sdist) => &sdist.name,
        }
    }

    /// The verbatim version segment.
    pub fn version(&self) -> &str {
        match self {
            Self::Wheel(wheel) => &wheel.version,
            Self::SourceDist(sdist) => &sdist.version,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilenameError {
    #[error(transparent)]
    Wheel(#[from] wheel::WheelFilenameError),
    #[error(transparent)]
    SourceDist(#[from] source_dist::SourceDistFilenameError),
}
