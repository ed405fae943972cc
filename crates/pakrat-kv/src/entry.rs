use serde::{Deserialize, Serialize};

/// A cached upstream HTTP response.
///
/// Persisted as JSON under the `data:` key; the wall-clock write time lives
/// under the sibling `time:` key. `headers` holds only the forwardable
/// subset; hop-by-hop and length/identity headers are filtered before an
/// entry is constructed, and the serving layer recomputes `content-length`
/// from the final body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status_code: u16,
    pub content: String,
    pub headers: Vec<(String, String)>,
}

impl CacheEntry {
    /// The entry served when the upstream is unreachable and nothing is
    /// cached: `503`, empty body, no headers.
    pub fn unavailable() -> Self {
        Self {
            status_code: 503,
            content: String::new(),
            headers: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let entry = CacheEntry {
            status_code: 200,
            content: "<html></html>".to_string(),
            headers: vec![("content-type".to_string(), "text/html".to_string())],
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"status_code":200,"content":"<html></html>","headers":[["content-type","text/html"]]}"#
        );

        let back: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn unavailable_is_empty() {
        let entry = CacheEntry::unavailable();
        assert_eq!(entry.status_code, 503);
        assert!(entry.content.is_empty());
        assert!(entry.headers.is_empty());
    }
}
