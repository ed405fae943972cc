use serde_json::Value;
use tracing::instrument;

use pakrat_filename::PypiFilekey;

use crate::{RewriteError, Rewritten};

/// Rewrite a PyPI JSON project document (`/pypi/<proj>/json` or
/// `/pypi/<proj>/<ver>/json`): every `releases[*][*].url` and `urls[*].url`
/// is replaced with a proxy file link.
#[instrument(skip_all)]
pub fn rewrite_pypi_json(payload: &str, public_url: &str) -> Result<Rewritten, RewriteError> {
    let mut doc: Value = serde_json::from_str(payload)?;
    let mut bindings = Vec::new();

    // Version-scoped documents omit `releases`; both keys are optional.
    if let Some(releases) = doc.get_mut("releases").and_then(Value::as_object_mut) {
        for files in releases.values_mut() {
            if let Some(files) = files.as_array_mut() {
                for file in files {
                    rewrite_file_object(file, public_url, &mut bindings)?;
                }
            }
        }
    }

    if let Some(urls) = doc.get_mut("urls").and_then(Value::as_array_mut) {
        for file in urls {
            rewrite_file_object(file, public_url, &mut bindings)?;
        }
    }

    Ok(Rewritten {
        payload: serde_json::to_string_pretty(&doc)?,
        bindings,
    })
}

/// Point one file object's `url` at the proxy and record the binding.
fn rewrite_file_object(
    file: &mut Value,
    public_url: &str,
    bindings: &mut Vec<(String, String)>,
) -> Result<(), RewriteError> {
    let Some(url) = file.get("url") else {
        return Ok(());
    };
    let Some(url) = url.as_str() else {
        return Err(RewriteError::MalformedManifest("url"));
    };

    let filekey = PypiFilekey::from_href(url)?;
    let proxy_href = format!("{public_url}/file/{}", filekey.link_token());
    bindings.push((filekey.key().to_string(), url.to_string()));
    file["url"] = Value::String(proxy_href);
    Ok(())
}
