use std::fmt::{Display, Formatter};

use thiserror::Error;
use url::Url;

/// An npm tarball location, split at the `/-/` separator the registry puts
/// between the package name and the artifact filename.
///
/// Package names are not globally unique across scopes, so the whole path is
/// the filekey in npm mode. The package part may contain one slash
/// (`@scope/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NpmTarballPath {
    pub package: String,
    pub filename: String,
}

impl NpmTarballPath {
    /// Split a registry path (no leading slash) into package and filename.
    pub fn from_path(path: &str) -> Result<Self, NpmPathError> {
        let path = path.trim_start_matches('/');
        let Some((package, filename)) = path.split_once("/-/") else {
            return Err(NpmPathError::MissingSeparator(path.to_string()));
        };
        if package.is_empty() || filename.is_empty() || filename.contains('/') {
            return Err(NpmPathError::MissingSeparator(path.to_string()));
        }
        Ok(Self {
            package: package.to_string(),
            filename: filename.to_string(),
        })
    }

    /// Split a full tarball URL, e.g.
    /// `https://registry.npmjs.org/@scope/pkg/-/pkg-1.0.0.tgz`.
    pub fn from_url(url: &str) -> Result<Self, NpmPathError> {
        let parsed = Url::parse(url).map_err(|err| NpmPathError::Url(url.to_string(), err))?;
        Self::from_path(parsed.path())
    }

    /// The filekey: the registry path, `<package>/-/<filename>`.
    pub fn key(&self) -> String {
        format!("{}/-/{}", self.package, self.filename)
    }
}

impl Display for NpmTarballPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/-/{}", self.package, self.filename)
    }
}

#[derive(Debug, Error)]
pub enum NpmPathError {
    #[error("Expected `<package>/-/<filename>` in tarball path: {0}")]
    MissingSeparator(String),
    #[error("Failed to parse tarball URL {0}")]
    Url(String, #[source] url::ParseError),
}
