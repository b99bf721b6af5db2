use std::future::Future;
use std::pin::Pin;

use super::{PdfLocator, PdfSource};
use crate::fetcher::PageFetcher;
use crate::page::FetchedPage;

const PDF_SUFFIX: &[u8] = b".pdf";

/// The lookup already landed on the PDF: the body ends in `.pdf`.
///
/// This is a byte heuristic, not a content-type check. The body is handed
/// over as-is so nothing is downloaded twice.
pub struct DirectBinary;

impl PdfLocator for DirectBinary {
    fn name(&self) -> &'static str {
        "direct-binary"
    }

    fn locate<'a>(
        &'a self,
        page: &'a FetchedPage,
        _fetcher: &'a PageFetcher,
    ) -> Pin<Box<dyn Future<Output = Option<PdfSource>> + Send + 'a>> {
        Box::pin(async move {
            page.body
                .ends_with(PDF_SUFFIX)
                .then(|| PdfSource::Inline(page.body.clone()))
        })
    }
}
