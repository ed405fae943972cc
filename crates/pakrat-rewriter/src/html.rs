use tl::HTMLTag;
use tracing::instrument;
use url::Url;

use pakrat_filename::PypiFilekey;

use crate::{RewriteError, Rewritten};

/// Rewrite a PyPI simple-index page so every anchor points at the proxy's
/// file route.
///
/// The output is the input byte-for-byte except for the href values: each
/// `href="<upstream>"` becomes `href="<public>/file/<filename>#<fragment>"`.
/// The fragment is appended literally: pip reads the `#sha256=...` suffix
/// off the link text and refuses percent-encoded forms.
#[instrument(skip(html, public_url))]
pub fn rewrite_simple_html(
    html: &str,
    page_url: &Url,
    public_url: &str,
) -> Result<Rewritten, RewriteError> {
    let dom = tl::parse(html, tl::ParserOptions::default())?;

    // The first `<base>` tag, if any, resolves relative hrefs. The HTML spec
    // requires it to appear before any tag carrying a URL attribute.
    let base = dom
        .nodes()
        .iter()
        .filter_map(|node| node.as_tag())
        .take_while(|tag| !matches!(tag.name().as_bytes(), b"a" | b"link"))
        .find(|tag| tag.name().as_bytes() == b"base")
        .map(parse_base)
        .transpose()?
        .flatten()
        .unwrap_or_else(|| page_url.clone());

    let mut payload = html.to_string();
    let mut bindings = Vec::new();

    for anchor in dom
        .nodes()
        .iter()
        .filter_map(|node| node.as_tag())
        .filter(|tag| tag.name().as_bytes() == b"a")
    {
        let raw_href = anchor
            .attributes()
            .get("href")
            .flatten()
            .filter(|bytes| !bytes.as_bytes().is_empty())
            .ok_or(RewriteError::MissingHref)?;
        let raw_href = std::str::from_utf8(raw_href.as_bytes())?;

        // Attribute values may carry entities (`&amp;`); the binding stores
        // the decoded, absolute URL.
        let href = html_escape::decode_html_entities(raw_href);
        let resolved = base
            .join(&href)
            .map_err(|err| RewriteError::UrlParse(href.to_string(), err))?;

        let filekey = PypiFilekey::from_href(resolved.as_str())?;
        let proxy_href = format!("{public_url}/file/{}", filekey.link_token());
        bindings.push((filekey.key().to_string(), resolved.to_string()));

        replace_href(&mut payload, raw_href, &proxy_href);
    }

    Ok(Rewritten { payload, bindings })
}

/// Parse the `href` from a `<base>` tag.
fn parse_base(base: &HTMLTag) -> Result<Option<Url>, RewriteError> {
    let Some(Some(href)) = base.attributes().get("href") else {
        return Ok(None);
    };
    let href = std::str::from_utf8(href.as_bytes())?;
    let url = Url::parse(href).map_err(|err| RewriteError::UrlParse(href.to_string(), err))?;
    Ok(Some(url))
}

/// Substitute one href attribute value in place, covering both quote styles.
fn replace_href(payload: &mut String, old: &str, new: &str) {
    let double = format!("href=\"{old}\"");
    if payload.contains(&double) {
        *payload = payload.replace(&double, &format!("href=\"{new}\""));
        return;
    }
    let single = format!("href='{old}'");
    if payload.contains(&single) {
        *payload = payload.replace(&single, &format!("href='{new}'"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<!DOCTYPE html>
<html>
  <body>
    <h1>Links for requests</h1>
    <a href="https://files.pythonhosted.org/packages/aa/bb/requests-1.0.tar.gz#sha256=abc">requests-1.0.tar.gz</a><br/>
  </body>
</html>
"#;

    fn page_url() -> Url {
        Url::parse("https://pypi.org/simple/requests/").unwrap()
    }

    #[test]
    fn rewrites_absolute_href_and_binds_filekey() {
        let result = rewrite_simple_html(PAGE, &page_url(), "http://proxy.local").unwrap();

        assert!(result.payload.contains(
            r#"href="http://proxy.local/file/requests-1.0.tar.gz#sha256=abc""#
        ));
        assert!(!result.payload.contains("files.pythonhosted.org"));
        assert_eq!(
            result.bindings,
            vec![(
                "requests-1.0.tar.gz".to_string(),
                "https://files.pythonhosted.org/packages/aa/bb/requests-1.0.tar.gz#sha256=abc"
                    .to_string(),
            )]
        );
    }

    #[test]
    fn everything_but_links_is_untouched() {
        let result = rewrite_simple_html(PAGE, &page_url(), "http://proxy.local").unwrap();
        assert!(result.payload.contains("<h1>Links for requests</h1>"));
        assert!(result.payload.contains(">requests-1.0.tar.gz</a><br/>"));
    }

    #[test]
    fn resolves_relative_hrefs_against_the_page() {
        let html = r#"<a href="../../packages/Jinja2-3.1.2-py3-none-any.whl#sha256=ff">x</a>"#;
        let result = rewrite_simple_html(html, &page_url(), "http://proxy.local").unwrap();
        assert_eq!(
            result.bindings,
            vec![(
                "Jinja2-3.1.2-py3-none-any.whl".to_string(),
                "https://pypi.org/packages/Jinja2-3.1.2-py3-none-any.whl#sha256=ff".to_string(),
            )]
        );
    }

    #[test]
    fn resolves_against_a_base_tag_when_present() {
        let html = r#"
<html>
  <head><base href="https://mirror.example/whl/"></head>
  <body><a href="pkg-1.0.tar.gz#sha256=aa">pkg-1.0.tar.gz</a></body>
</html>
"#;
        let result = rewrite_simple_html(html, &page_url(), "http://proxy.local").unwrap();
        assert_eq!(
            result.bindings,
            vec![(
                "pkg-1.0.tar.gz".to_string(),
                "https://mirror.example/whl/pkg-1.0.tar.gz#sha256=aa".to_string(),
            )]
        );
    }

    #[test]
    fn decodes_entities_in_hrefs() {
        let html = r#"<a href="https://host/f/pkg-1.0.zip?a=1&amp;b=2#sha256=cc">pkg</a>"#;
        let result = rewrite_simple_html(html, &page_url(), "http://proxy.local").unwrap();
        assert_eq!(
            result.bindings,
            vec![(
                "pkg-1.0.zip".to_string(),
                "https://host/f/pkg-1.0.zip?a=1&b=2#sha256=cc".to_string(),
            )]
        );
        // The raw attribute text (entities included) is what gets replaced.
        assert!(result
            .payload
            .contains(r#"href="http://proxy.local/file/pkg-1.0.zip#sha256=cc""#));
    }

    #[test]
    fn anchors_without_hrefs_are_an_error() {
        let html = "<a>pkg-1.0.tar.gz</a>";
        let err = rewrite_simple_html(html, &page_url(), "http://proxy.local").unwrap_err();
        assert!(matches!(err, RewriteError::MissingHref));
    }

    #[test]
    fn fragmentless_links_get_no_fragment() {
        let html = r#"<a href="https://host/pkg-2.0.tar.gz">pkg</a>"#;
        let result = rewrite_simple_html(html, &page_url(), "http://proxy.local").unwrap();
        assert!(result.payload.contains(r#"href="http://proxy.local/file/pkg-2.0.tar.gz""#));
    }
}
