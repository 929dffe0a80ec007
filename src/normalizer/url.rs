//! Canonical URL computation
//!
//! Collectors deliver the same item under many URL variants: tracking
//! parameters, fragments, mixed-case hosts, `www.` prefixes. The canonical
//! form strips all of that so the (content_hash, source_type) dedupe key is
//! joined by a stable URL for display and domain extraction.

use url::Url;

use super::EvidenceError;

/// Query parameters that identify campaigns/click-tracking, not content
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "igshid", "mc_cid", "mc_eid", "ref", "ref_src",
    "cmpid", "ocid", "smid", "partner", "share_id",
];

/// Canonicalize a source URL and extract its registrable domain.
///
/// - scheme and host lowercased (handled by the parser)
/// - fragment removed
/// - tracking query parameters removed (`utm_*` and the known list)
/// - trailing slash trimmed from non-root paths
/// - `www.` prefix dropped from the domain
pub fn canonicalize_url(raw: &str) -> Result<(String, String), EvidenceError> {
    let mut url =
        Url::parse(raw.trim()).map_err(|_| EvidenceError::InvalidUrl(raw.to_string()))?;

    let host = url
        .host_str()
        .ok_or_else(|| EvidenceError::InvalidUrl(raw.to_string()))?
        .to_string();

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut canonical = url.to_string();
    if canonical.ends_with('/') && url.path() != "/" {
        canonical.pop();
    }

    let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();

    Ok((canonical, domain))
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_utm_params() {
        let (url, _) =
            canonicalize_url("https://example.com/story?utm_source=tw&utm_medium=social").unwrap();
        assert_eq!(url, "https://example.com/story");
    }

    #[test]
    fn test_keeps_content_params() {
        let (url, _) = canonicalize_url("https://example.com/story?id=42&utm_source=tw").unwrap();
        assert_eq!(url, "https://example.com/story?id=42");
    }

    #[test]
    fn test_strips_fragment_and_trailing_slash() {
        let (url, _) = canonicalize_url("https://Example.COM/story/#comments").unwrap();
        assert_eq!(url, "https://example.com/story");
    }

    #[test]
    fn test_domain_drops_www() {
        let (_, domain) = canonicalize_url("https://www.example.com/a").unwrap();
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn test_same_item_same_canonical_form() {
        let (a, _) = canonicalize_url("https://example.com/story?fbclid=abc123").unwrap();
        let (b, _) = canonicalize_url("https://www.example.com:443/story/").unwrap();
        // host stays distinct (www is only stripped for the domain) but
        // both resolve tracking noise away
        assert_eq!(a, "https://example.com/story");
        assert_eq!(b, "https://www.example.com/story");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(canonicalize_url("not a url").is_err());
        assert!(canonicalize_url("").is_err());
    }
}
