//! A fetched landing page: buffered body, final URL, and the parts of its
//! HTML that strategies look at.
//!
//! `scraper::Html` is `!Send`, so the document is reduced to plain
//! meta/anchor records right after parsing. Strategies then run on any task.

use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

static META_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[name]").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// A `<meta name=... content=...>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag {
    pub name: String,
    pub content: Option<String>,
}

/// An `<a>` element with all of its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    attrs: Vec<(String, String)>,
}

impl Anchor {
    pub fn new(attrs: Vec<(String, String)>) -> Self {
        Self { attrs }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href").filter(|h| !h.trim().is_empty())
    }
}

/// Meta tags and anchors of a page, in document order.
#[derive(Debug, Clone, Default)]
pub struct PageDocument {
    pub metas: Vec<MetaTag>,
    pub anchors: Vec<Anchor>,
}

impl PageDocument {
    /// Parse `body` as HTML. Never fails: binary or malformed input simply
    /// yields fewer (or no) elements.
    pub fn parse(body: &[u8]) -> Self {
        let html = String::from_utf8_lossy(body);
        let document = Html::parse_document(&html);

        let metas = document
            .select(&META_SELECTOR)
            .filter_map(|el| {
                let name = el.value().attr("name")?;
                Some(MetaTag {
                    name: name.to_string(),
                    content: el.value().attr("content").map(str::to_string),
                })
            })
            .collect();

        let anchors = document
            .select(&ANCHOR_SELECTOR)
            .map(|el| {
                Anchor::new(
                    el.value()
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                )
            })
            .collect();

        Self { metas, anchors }
    }

    /// Content of the first meta tag called `name`, if it has a non-empty one.
    ///
    /// Only the first tag with that name is considered.
    pub fn meta_content(&self, name: &str) -> Option<&str> {
        self.metas
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.content.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// A page obtained with HTTP 200, fully buffered.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after following redirects.
    pub final_url: Url,
    pub body: Vec<u8>,
    pub document: PageDocument,
}

impl FetchedPage {
    pub fn new(final_url: Url, body: Vec<u8>) -> Self {
        let document = PageDocument::parse(&body);
        Self {
            final_url,
            body,
            document,
        }
    }

    /// `scheme://host[:port]` of the final URL.
    pub fn origin(&self) -> String {
        self.final_url.origin().ascii_serialization()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDING: &str = r#"<html><head>
        <meta name="citation_title" content="A study">
        <meta name="citation_pdf_url" content="https://pubs.example.org/doi/pdf/10.1/x">
        <meta name="citation_pdf_url" content="https://mirror.example.org/x.pdf">
        <meta property="og:title" content="ignored: no name attribute">
        </head><body>
        <a href="/about">About</a>
        <a title="High-res PDF" href="/doi/pdf/10.1/x">PDF</a>
        <a name="top">no href</a>
        </body></html>"#;

    #[test]
    fn collects_metas_with_names_in_order() {
        let doc = PageDocument::parse(LANDING.as_bytes());
        let names: Vec<_> = doc.metas.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["citation_title", "citation_pdf_url", "citation_pdf_url"]
        );
    }

    #[test]
    fn meta_content_returns_first_match() {
        let doc = PageDocument::parse(LANDING.as_bytes());
        assert_eq!(
            doc.meta_content("citation_pdf_url"),
            Some("https://pubs.example.org/doi/pdf/10.1/x")
        );
        assert_eq!(doc.meta_content("citation_doi"), None);
    }

    #[test]
    fn empty_meta_content_is_no_match() {
        let doc = PageDocument::parse(br#"<meta name="citation_pdf_url" content="">"#);
        assert_eq!(doc.meta_content("citation_pdf_url"), None);
    }

    #[test]
    fn anchors_keep_attributes() {
        let doc = PageDocument::parse(LANDING.as_bytes());
        assert_eq!(doc.anchors.len(), 3);
        assert_eq!(doc.anchors[1].attr("title"), Some("High-res PDF"));
        assert_eq!(doc.anchors[1].href(), Some("/doi/pdf/10.1/x"));
        assert_eq!(doc.anchors[2].href(), None);
    }

    #[test]
    fn binary_body_parses_to_nothing_useful() {
        let doc = PageDocument::parse(b"%PDF-1.7\n\x00\x01\x02binary");
        assert!(doc.metas.is_empty());
        assert!(doc.anchors.is_empty());
    }

    #[test]
    fn origin_drops_path_and_keeps_port() {
        let page = FetchedPage::new(
            Url::parse("https://pubs.example.org/article/1?x=2").unwrap(),
            Vec::new(),
        );
        assert_eq!(page.origin(), "https://pubs.example.org");

        let page = FetchedPage::new(
            Url::parse("http://127.0.0.1:8080/article/1").unwrap(),
            Vec::new(),
        );
        assert_eq!(page.origin(), "http://127.0.0.1:8080");
    }
}
