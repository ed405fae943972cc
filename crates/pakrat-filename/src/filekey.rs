use std::fmt::{Display, Formatter};

use thiserror::Error;

/// The token a rewritten PyPI link carries in place of the upstream URL.
///
/// PyPI filenames are globally unique, so the bare filename is the lookup
/// identity. The URL fragment (`#sha256=...`) rides along for display only:
/// installers keep it client-side and request the bare filename, so it must
/// never participate in lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PypiFilekey {
    filename: String,
    fragment: Option<String>,
}

impl PypiFilekey {
    /// Derive the filekey from an upstream `href`, which may be relative and
    /// may carry a fragment.
    pub fn from_href(href: &str) -> Result<Self, FilekeyError> {
        let (path, fragment) = match href.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment)),
            None => (href, None),
        };

        // Drop any query before taking the terminal path component.
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        let filename = path
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| FilekeyError::MissingFilename(href.to_string()))?;

        Ok(Self {
            filename: filename.to_string(),
            fragment: fragment.map(ToString::to_string),
        })
    }

    /// The lookup identity: the bare filename, fragment excluded.
    pub fn key(&self) -> &str {
        &self.filename
    }

    /// The token to embed in a rewritten link, fragment appended literally.
    pub fn link_token(&self) -> String {
        match &self.fragment {
            Some(fragment) => format!("{}#{}", self.filename, fragment),
            None => self.filename.clone(),
        }
    }
}

impl Display for PypiFilekey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.link_token())
    }
}

/// Normalize a filekey received on the file route: strip any `#fragment`
/// suffix a literal-minded client left in the path.
pub fn normalize_filekey(raw: &str) -> &str {
    raw.split_once('#').map_or(raw, |(key, _)| key)
}

#[derive(Debug, Error)]
pub enum FilekeyError {
    #[error("Expected a filename as the last path component of URL: {0}")]
    MissingFilename(String),
}
