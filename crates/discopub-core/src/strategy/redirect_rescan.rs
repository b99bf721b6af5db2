use std::future::Future;
use std::pin::Pin;

use reqwest::Url;

use super::citation_meta::citation_pdf_url;
use super::{PdfLocator, PdfSource};
use crate::fetcher::PageFetcher;
use crate::page::FetchedPage;

/// ScienceDirect: the landing URL carries the article URL percent-encoded
/// (linkinghub `retrieve` pages). Decode it, fetch that page once and read
/// its `citation_pdf_url` meta tag.
///
/// The only strategy that makes a request of its own. Any failure of that
/// request is a plain miss.
pub struct RedirectRescan;

impl PdfLocator for RedirectRescan {
    fn name(&self) -> &'static str {
        "redirect-rescan"
    }

    fn locate<'a>(
        &'a self,
        page: &'a FetchedPage,
        fetcher: &'a PageFetcher,
    ) -> Pin<Box<dyn Future<Output = Option<PdfSource>> + Send + 'a>> {
        Box::pin(async move {
            let decoded = urlencoding::decode(page.final_url.as_str()).ok()?;
            let target = match Url::parse(&decoded) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!(url = %decoded, error = %e, "decoded landing URL is not a URL");
                    return None;
                }
            };

            match fetcher.get_page(target.clone()).await {
                Ok(rescanned) => citation_pdf_url(&rescanned.document).map(PdfSource::Url),
                Err(e) => {
                    tracing::debug!(url = %target, error = %e, "rescan request failed");
                    None
                }
            }
        })
    }
}
