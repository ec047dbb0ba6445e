use thiserror::Error;
use url::Url;

/// Errors that can occur while turning a scraped href into an absolute link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Nothing left after trimming.
    #[error("empty link")]
    Empty,
    /// The href is relative and no base URL was available to resolve it.
    #[error("relative link {0:?} without a base URL")]
    NoBase(String),
    /// The href could not be parsed, even against the base.
    #[error("invalid link {href:?}: {reason}")]
    Invalid { href: String, reason: String },
    /// The link resolved to something other than http or https.
    #[error("unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Resolves a scraped href to a canonical absolute http(s) URL.
///
/// Repairs the mangled forms that show up in real listings before parsing:
///
/// - surrounding whitespace
/// - duplicated slashes after the scheme (`https:////cdn.example.com/a.jpg`)
/// - protocol-relative links (`//cdn.example.com/a.jpg`), which take the
///   base's scheme, or `https` when there is no base
/// - root-relative and path-relative links, joined onto `base`
///
/// The fragment is dropped so `#reviews` anchors do not produce a distinct
/// identity for the same page.
///
/// # Errors
///
/// Returns [`LinkError`] if the href is empty, relative without a base,
/// unparsable, or resolves to a non-HTTP scheme (`javascript:`, `mailto:`, ...).
///
/// # Examples
///
/// ```
/// use stablefeed::util::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://www.example.com/store/list.html").unwrap();
/// let url = resolve_link("/product/1", Some(&base)).unwrap();
/// assert_eq!(url.as_str(), "https://www.example.com/product/1");
///
/// let url = resolve_link("https:////cdn.example.com/a.jpg", None).unwrap();
/// assert_eq!(url.as_str(), "https://cdn.example.com/a.jpg");
/// ```
pub fn resolve_link(href: &str, base: Option<&Url>) -> Result<Url, LinkError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(LinkError::Empty);
    }

    let repaired = collapse_scheme_slashes(href);

    let mut url = if let Some(rest) = repaired.strip_prefix("//") {
        let scheme = base.map(Url::scheme).unwrap_or("https");
        parse(&format!("{scheme}://{rest}"), href)?
    } else {
        match Url::parse(&repaired) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match base {
                Some(base) => base.join(&repaired).map_err(|e| LinkError::Invalid {
                    href: href.to_string(),
                    reason: e.to_string(),
                })?,
                None => return Err(LinkError::NoBase(href.to_string())),
            },
            Err(e) => {
                return Err(LinkError::Invalid {
                    href: href.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    };

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(LinkError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(LinkError::Invalid {
            href: href.to_string(),
            reason: "missing host".to_string(),
        });
    }

    url.set_fragment(None);
    Ok(url)
}

fn parse(candidate: &str, original: &str) -> Result<Url, LinkError> {
    Url::parse(candidate).map_err(|e| LinkError::Invalid {
        href: original.to_string(),
        reason: e.to_string(),
    })
}

/// `https:////host/x` → `https://host/x`. Leaves everything else alone.
fn collapse_scheme_slashes(href: &str) -> String {
    for scheme in ["https:", "http:"] {
        if let Some(rest) = href.strip_prefix(scheme) {
            if rest.starts_with("///") {
                return format!("{scheme}//{}", rest.trim_start_matches('/'));
            }
        }
    }
    href.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.onitsukatiger.com/jp/ja-jp/store/all/shoes/sneakers.html").unwrap()
    }

    #[test]
    fn test_absolute_link_kept() {
        let url = resolve_link("https://example.com/a?b=1", Some(&base())).unwrap();
        assert_eq!(url.as_str(), "https://example.com/a?b=1");
    }

    #[test]
    fn test_root_relative_joined_on_base() {
        let url = resolve_link("/jp/ja-jp/product/1183A", Some(&base())).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.onitsukatiger.com/jp/ja-jp/product/1183A"
        );
    }

    #[test]
    fn test_path_relative_joined_on_base() {
        let url = resolve_link("serrano.html", Some(&base())).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.onitsukatiger.com/jp/ja-jp/store/all/shoes/serrano.html"
        );
    }

    #[test]
    fn test_protocol_relative_takes_base_scheme() {
        let http_base = Url::parse("http://example.com/").unwrap();
        let url = resolve_link("//cdn.example.com/a.jpg", Some(&http_base)).unwrap();
        assert_eq!(url.as_str(), "http://cdn.example.com/a.jpg");

        let url = resolve_link("//cdn.example.com/a.jpg", None).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_duplicated_scheme_slashes_collapsed() {
        let url = resolve_link("https:////cdn.example.com/a.jpg", None).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.jpg");
        let url = resolve_link("http:///cdn.example.com/a.jpg", None).unwrap();
        assert_eq!(url.as_str(), "http://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_whitespace_trimmed_and_fragment_dropped() {
        let url = resolve_link("  https://example.com/post/1#comments \n", None).unwrap();
        assert_eq!(url.as_str(), "https://example.com/post/1");
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(resolve_link("   ", Some(&base())), Err(LinkError::Empty));
    }

    #[test]
    fn test_relative_without_base_rejected() {
        assert!(matches!(
            resolve_link("/product/1", None),
            Err(LinkError::NoBase(_))
        ));
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        assert!(matches!(
            resolve_link("javascript:void(0)", Some(&base())),
            Err(LinkError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            resolve_link("mailto:shop@example.com", Some(&base())),
            Err(LinkError::UnsupportedScheme(_))
        ));
    }
}
