//! PDF locator trait and the publisher-specific implementations.

pub mod anchors;
pub mod citation_meta;
pub mod direct_binary;
pub mod redirect_rescan;

use std::future::Future;
use std::pin::Pin;

use crate::fetcher::PageFetcher;
use crate::page::FetchedPage;

pub use anchors::{DownloadTypeAnchor, HrefBase, HrefPatternAnchor, TitledPdfAnchor};
pub use citation_meta::CitationPdfMeta;
pub use direct_binary::DirectBinary;
pub use redirect_rescan::RedirectRescan;

/// Where the PDF comes from once a strategy has found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfSource {
    /// Absolute URL still to be downloaded.
    Url(String),
    /// The fetched body itself is the PDF.
    Inline(Vec<u8>),
}

/// A rule that inspects one fetched page and proposes a PDF location.
///
/// Implementations look only at `page`; the fetcher is there for the rare
/// strategy that has to follow the page somewhere else first.
pub trait PdfLocator: Send + Sync {
    /// Short stable name, used in logs and reports.
    fn name(&self) -> &'static str;

    fn locate<'a>(
        &'a self,
        page: &'a FetchedPage,
        fetcher: &'a PageFetcher,
    ) -> Pin<Box<dyn Future<Output = Option<PdfSource>> + Send + 'a>>;
}

/// Resolve `href` against `origin` (`scheme://host[:port]`).
///
/// Absolute hrefs are kept, protocol-relative ones borrow the origin's
/// scheme, and everything else is appended to the origin.
pub fn resolve_href(origin: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = origin.split("://").next().unwrap_or("https");
        return format!("{}://{}", scheme, rest);
    }
    let origin = origin.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{}{}", origin, href)
    } else {
        format!("{}/{}", origin, href)
    }
}
