use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::normalize_project_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceDistExtension {
    Zip,
    TarGz,
}

impl SourceDistExtension {
    pub fn from_filename(filename: &str) -> Option<(&str, Self)> {
        if let Some(stem) = filename.strip_suffix(".zip") {
            return Some((stem, Self::Zip));
        }
        if let Some(stem) = filename.strip_suffix(".tar.gz") {
            return Some((stem, Self::TarGz));
        }
        None
    }
}

impl Display for SourceDistExtension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zip => f.write_str("zip"),
            Self::TarGz => f.write_str("tar.gz"),
        }
    }
}

/// A source distribution filename, split into project name and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceDistFilename {
    /// Normalized project name.
    pub name: String,
    /// Verbatim version segment.
    pub version: String,
    pub extension: SourceDistExtension,
}

impl SourceDistFilename {
    /// Parse a source distribution filename without knowing the package name
    /// up front.
    ///
    /// Source dist filenames can be ambiguous (`a-1-1.tar.gz`); since
    /// registries serve normalized filenames, we assume the version contains
    /// no minus and split on the last one.
    pub fn parse(filename: &str) -> Result<Self, SourceDistFilenameError> {
        let Some((stem, extension)) = SourceDistExtension::from_filename(filename) else {
            return Err(SourceDistFilenameError {
                filename: filename.to_string(),
                kind: SourceDistFilenameErrorKind::Extension,
            });
        };

        let Some((name, version)) = stem.rsplit_once('-') else {
            return Err(SourceDistFilenameError {
                filename: filename.to_string(),
                kind: SourceDistFilenameErrorKind::Minus,
            });
        };

        if name.is_empty() {
            return Err(SourceDistFilenameError {
                filename: filename.to_string(),
                kind: SourceDistFilenameErrorKind::PackageName,
            });
        }
        if !version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(SourceDistFilenameError {
                filename: filename.to_string(),
                kind: SourceDistFilenameErrorKind::Version,
            });
        }

        Ok(Self {
            name: normalize_project_name(name),
            version: version.to_string(),
            extension,
        })
    }
}

impl Display for SourceDistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.version, self.extension)
    }
}

#[derive(Error, Debug, Clone)]
pub struct SourceDistFilenameError {
    filename: String,
    kind: SourceDistFilenameErrorKind,
}

impl Display for SourceDistFilenameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to parse source distribution filename {}: {}",
            self.filename, self.kind
        )
    }
}

#[derive(Error, Debug, Clone)]
enum SourceDistFilenameErrorKind {
    #[error("Source distribution filenames must end with .zip or .tar.gz")]
    Extension,
    #[error("Version section is invalid")]
    Version,
    #[error("Name section is empty")]
    PackageName,
    #[error("Missing name-version separator")]
    Minus,
}
