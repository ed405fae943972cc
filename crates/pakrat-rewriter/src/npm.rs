use serde_json::Value;
use tracing::instrument;

use pakrat_filename::NpmTarballPath;

use crate::{RewriteError, Rewritten};

/// Rewrite an npm package document: every `versions[*].dist.tarball` (or
/// the single top-level `dist.tarball` of a version-scoped document) is
/// replaced with `<public>/<package>/-/<filename>`, the path shape the npm
/// client expects.
#[instrument(skip_all)]
pub fn rewrite_npm_json(payload: &str, public_url: &str) -> Result<Rewritten, RewriteError> {
    let mut doc: Value = serde_json::from_str(payload)?;
    let mut bindings = Vec::new();

    if let Some(versions) = doc.get_mut("versions").and_then(Value::as_object_mut) {
        for version in versions.values_mut() {
            if let Some(dist) = version.get_mut("dist") {
                rewrite_dist_object(dist, public_url, &mut bindings)?;
            }
        }
    } else if let Some(dist) = doc.get_mut("dist") {
        rewrite_dist_object(dist, public_url, &mut bindings)?;
    }

    Ok(Rewritten {
        payload: serde_json::to_string(&doc)?,
        bindings,
    })
}

fn rewrite_dist_object(
    dist: &mut Value,
    public_url: &str,
    bindings: &mut Vec<(String, String)>,
) -> Result<(), RewriteError> {
    let Some(tarball) = dist.get("tarball") else {
        return Ok(());
    };
    let Some(tarball) = tarball.as_str() else {
        return Err(RewriteError::MalformedManifest("dist.tarball"));
    };

    let path = NpmTarballPath::from_url(tarball)?;
    let proxy_href = format!("{public_url}/{}/-/{}", path.package, path.filename);
    bindings.push((path.key(), tarball.to_string()));
    dist["tarball"] = Value::String(proxy_href);
    Ok(())
}
