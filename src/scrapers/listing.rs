//! Anchor extraction from HTML directory listings (Apache/nginx autoindex pages).

use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static anchor selector"));

/// One `<a href>` from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub text: String,
    pub href: String,
    /// `href` resolved against the page URL
    pub url: String,
}

impl Anchor {
    /// Lower-cased `text href`, the haystack for keyword and marker matching.
    pub fn haystack(&self) -> String {
        format!("{} {}", self.text, self.href).to_lowercase()
    }

    /// Last non-empty path segment of the href, without query string.
    pub fn last_segment(&self) -> &str {
        let path = self.href.split(|c: char| c == '?' || c == '#').next().unwrap_or("");
        path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
    }

    /// Sort links and the parent directory entry that every autoindex page carries.
    pub fn is_navigation(&self) -> bool {
        let href = self.href.trim();
        href.is_empty()
            || href.starts_with('?')
            || href.starts_with('#')
            || href == "../"
            || href == ".."
            || href == "/"
            || self.text.trim().eq_ignore_ascii_case("parent directory")
    }
}

/// Parse a listing page into its anchors, in document order.
pub fn parse_anchors(page_url: &str, html: &str) -> Vec<Anchor> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|element| {
            let href = element.value().attr("href")?.trim().to_string();
            let text = element.text().collect::<String>().trim().to_string();
            let url = resolve_url(page_url, &href);
            Some(Anchor { text, href, url })
        })
        .collect()
}

/// Resolve `href` relative to a directory page. The page is treated as a directory even
/// when its URL lacks the trailing slash, which is how listing servers link folders.
pub fn resolve_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let dir = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    match Url::parse(&dir).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{dir}{}", href.trim_start_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body><h1>Index of /FTP/PDA/demonstracoes_contabeis</h1>
        <table>
          <tr><td><a href="?C=N;O=D">Name</a></td></tr>
          <tr><td><a href="/FTP/PDA/">Parent Directory</a></td></tr>
          <tr><td><a href="2023/">2023/</a></td></tr>
          <tr><td><a href="2024/">2024/</a></td></tr>
          <tr><td><a>no href</a></td></tr>
        </table></body></html>"#;

    #[test]
    fn anchors_are_resolved_against_the_page() {
        let anchors = parse_anchors("https://host/FTP/PDA/demonstracoes_contabeis", PAGE);
        assert_eq!(anchors.len(), 4);
        assert_eq!(anchors[2].url, "https://host/FTP/PDA/demonstracoes_contabeis/2023/");
        assert_eq!(anchors[1].url, "https://host/FTP/PDA/");
    }

    #[test]
    fn navigation_entries_are_recognised() {
        let anchors = parse_anchors("https://host/dir/", PAGE);
        assert!(anchors[0].is_navigation());
        assert!(anchors[1].is_navigation());
        assert!(!anchors[2].is_navigation());
    }

    #[test]
    fn last_segment_ignores_slashes_and_queries() {
        let anchor = Anchor {
            text: String::new(),
            href: "https://host/a/2024/?x=1".into(),
            url: String::new(),
        };
        assert_eq!(anchor.last_segment(), "2024");
    }

    #[test]
    fn absolute_hrefs_pass_through() {
        assert_eq!(resolve_url("https://a/b/", "https://c/d.zip"), "https://c/d.zip");
        assert_eq!(resolve_url("https://a/b/", "1T2024.zip"), "https://a/b/1T2024.zip");
    }
}
