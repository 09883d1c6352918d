//! Indexer link rewriting for the download client's network.

use reqwest::Url;

/// Route an `http(s)` link through `override_base`.
///
/// Scheme, host and port come from the override and its path is prepended to
/// the link's path. Magnets, other schemes and unparsable input are returned
/// unchanged.
pub fn rewrite_link(link: &str, override_base: Option<&str>) -> String {
    let Some(base) = override_base.map(str::trim).filter(|b| !b.is_empty()) else {
        return link.to_string();
    };

    let lower = link.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return link.to_string();
    }

    match rewrite(link, base) {
        Some(rewritten) => rewritten,
        None => link.to_string(),
    }
}

fn rewrite(link: &str, base: &str) -> Option<String> {
    let mut url = Url::parse(link).ok()?;
    let base = Url::parse(base).ok()?;

    url.set_scheme(base.scheme()).ok()?;
    url.set_host(base.host_str()).ok()?;
    url.set_port(base.port()).ok()?;

    let prefix = base.path().trim_end_matches('/');
    if !prefix.is_empty() {
        let path = format!("{}{}", prefix, url.path());
        url.set_path(&path);
    }

    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_host_and_port() {
        assert_eq!(
            rewrite_link(
                "http://localhost:9117/dl/rutracker/?jackett_apikey=k&path=abc",
                Some("http://jackett:9117")
            ),
            "http://jackett:9117/dl/rutracker/?jackett_apikey=k&path=abc"
        );
    }

    #[test]
    fn test_rewrite_with_path_prefix_and_scheme() {
        assert_eq!(
            rewrite_link("http://public.example:9117/dl/x?a=1", Some("https://proxy/jackett/")),
            "https://proxy/jackett/dl/x?a=1"
        );
    }

    #[test]
    fn test_non_http_links_untouched() {
        let magnet = "magnet:?xt=urn:btih:ABC";
        assert_eq!(rewrite_link(magnet, Some("http://jackett:9117")), magnet);
    }

    #[test]
    fn test_no_override_or_bad_input() {
        assert_eq!(rewrite_link("http://a/b", None), "http://a/b");
        assert_eq!(rewrite_link("http://a/b", Some("  ")), "http://a/b");
        assert_eq!(rewrite_link("http://a/b", Some("not a url")), "http://a/b");
        assert_eq!(rewrite_link("http://[bad/b", Some("http://x")), "http://[bad/b");
    }
}
