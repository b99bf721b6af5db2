use std::future::Future;
use std::pin::Pin;

use super::{PdfLocator, PdfSource};
use crate::fetcher::PageFetcher;
use crate::page::{FetchedPage, PageDocument};

/// Meta tag many publisher platforms (HighWire, Atypon, OJS...) fill with
/// an absolute PDF link.
pub const CITATION_PDF_META: &str = "citation_pdf_url";

pub(crate) fn citation_pdf_url(document: &PageDocument) -> Option<String> {
    document.meta_content(CITATION_PDF_META).map(str::to_string)
}

/// `<meta name="citation_pdf_url" content="...">`, content used verbatim.
pub struct CitationPdfMeta;

impl PdfLocator for CitationPdfMeta {
    fn name(&self) -> &'static str {
        "citation-pdf-meta"
    }

    fn locate<'a>(
        &'a self,
        page: &'a FetchedPage,
        _fetcher: &'a PageFetcher,
    ) -> Pin<Box<dyn Future<Output = Option<PdfSource>> + Send + 'a>> {
        Box::pin(async move { citation_pdf_url(&page.document).map(PdfSource::Url) })
    }
}
