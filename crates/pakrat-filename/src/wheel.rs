use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::normalize_project_name;

/// The parts of a wheel filename the proxy cares about: the project and the
/// version. Tags are validated for presence but not interpreted; a mirror
/// never needs to rank platform compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WheelFilename {
    /// Normalized project name.
    pub name: String,
    /// Verbatim version segment.
    pub version: String,
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let stem = filename.strip_suffix(".whl").ok_or_else(|| {
            WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "Must end with .whl".to_string(),
            )
        })?;
        Self::parse(stem, filename)
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

impl WheelFilename {
    /// Parse a wheel filename from its stem (e.g., `foo-1.2.3-py3-none-any`).
    ///
    /// The wheel filename contains either five or six `-`-separated entries;
    /// if six, the third entry is the build tag.
    /// <https://www.python.org/dev/peps/pep-0427/#file-name-convention>
    fn parse(stem: &str, filename: &str) -> Result<Self, WheelFilenameError> {
        let mut parts = stem.split('-');

        let name = parts
            .next()
            .expect("split always yields 1 or more elements");

        let Some(version) = parts.next() else {
            return Err(WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "Must have a version".to_string(),
            ));
        };

        // Three trailing tag entries, plus at most one build tag.
        match parts.count() {
            3 | 4 => {}
            n if n < 3 => {
                return Err(WheelFilenameError::InvalidWheelFileName(
                    filename.to_string(),
                    "Must have a Python tag, an ABI tag, and a platform tag".to_string(),
                ));
            }
            _ => {
                return Err(WheelFilenameError::InvalidWheelFileName(
                    filename.to_string(),
                    "Must have 5 or 6 components, but has more".to_string(),
                ));
            }
        }

        if name.is_empty() {
            return Err(WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "Must have a package name".to_string(),
            ));
        }
        if !version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(WheelFilenameError::InvalidVersion(filename.to_string()));
        }

        Ok(Self {
            name: normalize_project_name(name),
            version: version.to_string(),
        })
    }
}

#[derive(Error, Debug)]
pub enum WheelFilenameError {
    #[error("The wheel filename \"{0}\" is invalid: {1}")]
    InvalidWheelFileName(String, String),
    #[error("The wheel filename \"{0}\" has an invalid version: must start with a digit")]
    InvalidVersion(String),
}
