//! Strategies that pick a PDF link out of the page's `<a>` elements.
//!
//! Each takes the first qualifying anchor in document order. An anchor
//! that qualifies but has no href ends the search with no match.

use std::future::Future;
use std::pin::Pin;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{PdfLocator, PdfSource, resolve_href};
use crate::fetcher::PageFetcher;
use crate::page::{Anchor, FetchedPage};

/// Atypon-style PDF paths (`/doi/pdf/10.xxxx/...`).
pub static DOI_PDF_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"/doi/pdf").unwrap());

/// PubMed Central article links (`/pmc/articles/PMCxxxx/...`).
pub static PMC_ARTICLE_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"/pmc/articles").unwrap());

fn first_href<'p>(page: &'p FetchedPage, qualifies: impl Fn(&Anchor) -> bool) -> Option<&'p str> {
    page.document
        .anchors
        .iter()
        .find(|a| qualifies(*a))
        .and_then(Anchor::href)
}

/// ACS Publications: `<a title="High-Res PDF">` / `<a title="Low-Res PDF">`.
pub struct TitledPdfAnchor;

impl TitledPdfAnchor {
    fn qualifies(anchor: &Anchor) -> bool {
        anchor
            .attr("title")
            .map(|t| {
                let t = t.to_lowercase();
                t.contains("high-res pdf") || t.contains("low-res pdf")
            })
            .unwrap_or(false)
    }
}

impl PdfLocator for TitledPdfAnchor {
    fn name(&self) -> &'static str {
        "titled-pdf-anchor"
    }

    fn locate<'a>(
        &'a self,
        page: &'a FetchedPage,
        _fetcher: &'a PageFetcher,
    ) -> Pin<Box<dyn Future<Output = Option<PdfSource>> + Send + 'a>> {
        Box::pin(async move {
            first_href(page, Self::qualifies)
                .map(|href| PdfSource::Url(resolve_href(&page.origin(), href)))
        })
    }
}

/// NEJM: `<a data-download-type="article pdf">`.
pub struct DownloadTypeAnchor;

impl DownloadTypeAnchor {
    fn qualifies(anchor: &Anchor) -> bool {
        anchor
            .attr("data-download-type")
            .map(|t| t.eq_ignore_ascii_case("article pdf"))
            .unwrap_or(false)
    }
}

impl PdfLocator for DownloadTypeAnchor {
    fn name(&self) -> &'static str {
        "download-type-anchor"
    }

    fn locate<'a>(
        &'a self,
        page: &'a FetchedPage,
        _fetcher: &'a PageFetcher,
    ) -> Pin<Box<dyn Future<Output = Option<PdfSource>> + Send + 'a>> {
        Box::pin(async move {
            first_href(page, Self::qualifies)
                .map(|href| PdfSource::Url(resolve_href(&page.origin(), href)))
        })
    }
}

/// What a matched href is resolved against.
#[derive(Debug, Clone)]
pub enum HrefBase {
    /// The fetched page's own `scheme://host`.
    PageOrigin,
    /// A fixed host, for links into a different domain than the page's.
    Fixed(String),
}

/// First anchor whose href matches `pattern` anywhere.
pub struct HrefPatternAnchor {
    name: &'static str,
    pattern: &'static Regex,
    base: HrefBase,
}

impl HrefPatternAnchor {
    pub fn new(name: &'static str, pattern: &'static Regex, base: HrefBase) -> Self {
        Self {
            name,
            pattern,
            base,
        }
    }

    /// Future Medicine and other Atypon sites: `/doi/pdf/...` on the page's host.
    pub fn doi_pdf() -> Self {
        Self::new("doi-pdf-anchor", &DOI_PDF_HREF, HrefBase::PageOrigin)
    }

    /// PubMed Central: `/pmc/articles/...` on the repository host.
    pub fn pmc_article(repository_base_url: impl Into<String>) -> Self {
        Self::new(
            "pmc-article-anchor",
            &PMC_ARTICLE_HREF,
            HrefBase::Fixed(repository_base_url.into()),
        )
    }
}

impl PdfLocator for HrefPatternAnchor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn locate<'a>(
        &'a self,
        page: &'a FetchedPage,
        _fetcher: &'a PageFetcher,
    ) -> Pin<Box<dyn Future<Output = Option<PdfSource>> + Send + 'a>> {
        Box::pin(async move {
            let href = first_href(page, |a| {
                a.href().map(|h| self.pattern.is_match(h)).unwrap_or(false)
            })?;
            let url = match &self.base {
                HrefBase::PageOrigin => resolve_href(&page.origin(), href),
                HrefBase::Fixed(base) => resolve_href(base, href),
            };
            Some(PdfSource::Url(url))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{offline_fetcher, page};

    fn url(s: &str) -> Option<PdfSource> {
        Some(PdfSource::Url(s.to_string()))
    }

    #[tokio::test]
    async fn high_res_title_resolves_against_page_host() {
        let p = page(
            "https://pubs.example.org/article/1",
            r#"<a href="/toc">Issue</a><a title="High-res PDF" href="/doi/pdf/10.1/x">PDF</a>"#,
        );
        assert_eq!(
            TitledPdfAnchor.locate(&p, &offline_fetcher()).await,
            url("https://pubs.example.org/doi/pdf/10.1/x")
        );
    }

    #[tokio::test]
    async fn low_res_title_matches_case_insensitively() {
        let p = page(
            "https://pubs.acs.org/doi/10.1021/abc",
            r#"<a title="Download LOW-RES PDF (2 MB)" href="/doi/pdf/10.1021/abc">PDF</a>"#,
        );
        assert_eq!(
            TitledPdfAnchor.locate(&p, &offline_fetcher()).await,
            url("https://pubs.acs.org/doi/pdf/10.1021/abc")
        );
    }

    #[tokio::test]
    async fn first_titled_anchor_wins() {
        let p = page(
            "https://pubs.acs.org/doi/10.1021/abc",
            r#"<a title="High-Res PDF" href="/first.pdf">1</a><a title="High-Res PDF" href="/second.pdf">2</a>"#,
        );
        assert_eq!(
            TitledPdfAnchor.locate(&p, &offline_fetcher()).await,
            url("https://pubs.acs.org/first.pdf")
        );
    }

    #[tokio::test]
    async fn unrelated_title_is_no_match() {
        let p = page(
            "https://pubs.acs.org/doi/10.1021/abc",
            r#"<a title="Supporting information" href="/suppl">SI</a>"#,
        );
        assert_eq!(TitledPdfAnchor.locate(&p, &offline_fetcher()).await, None);
    }

    #[tokio::test]
    async fn download_type_requires_exact_value() {
        let p = page(
            "https://www.nejm.org/doi/full/10.1056/NEJMoa1",
            r#"<a data-download-type="article pdf (supplement)" href="/s.pdf">S</a>
               <a data-download-type="Article PDF" href="/doi/pdf/10.1056/NEJMoa1">PDF</a>"#,
        );
        assert_eq!(
            DownloadTypeAnchor.locate(&p, &offline_fetcher()).await,
            url("https://www.nejm.org/doi/pdf/10.1056/NEJMoa1")
        );
    }

    #[tokio::test]
    async fn download_type_absent_is_no_match() {
        let p = page("https://www.nejm.org/doi/full/x", r#"<a href="/doi/pdf/x">PDF</a>"#);
        assert_eq!(DownloadTypeAnchor.locate(&p, &offline_fetcher()).await, None);
    }

    #[tokio::test]
    async fn doi_pdf_pattern_matches_anywhere_in_href() {
        let p = page(
            "https://www.futuremedicine.com/doi/10.2217/fon-2019-0001",
            r#"<a href="/action/showCitFormats">Cite</a>
               <a href="/doi/pdf/10.2217/fon-2019-0001">PDF</a>"#,
        );
        assert_eq!(
            HrefPatternAnchor::doi_pdf()
                .locate(&p, &offline_fetcher())
                .await,
            url("https://www.futuremedicine.com/doi/pdf/10.2217/fon-2019-0001")
        );
    }

    #[tokio::test]
    async fn pmc_link_uses_repository_host_not_page_host() {
        let p = page(
            "https://linkout.example.com/landing?id=5",
            r#"<a href="/pmc/articles/PMC123456/">Free full text</a>"#,
        );
        let strategy = HrefPatternAnchor::pmc_article("https://www.ncbi.nlm.nih.gov");
        assert_eq!(
            strategy.locate(&p, &offline_fetcher()).await,
            url("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123456/")
        );
    }

    #[tokio::test]
    async fn pattern_strategies_ignore_anchors_without_href() {
        let p = page("https://example.org/a", r#"<a name="/doi/pdf">x</a>"#);
        assert_eq!(
            HrefPatternAnchor::doi_pdf()
                .locate(&p, &offline_fetcher())
                .await,
            None
        );
    }
}
