//! Paginated fetch on top of the retry loop
//!
//! Every page is an independent engine invocation; the only state shared
//! between pages is the strategy's rate limiter.

use rawfetch_http::response::header_link;
use rawfetch_http::{HttpRequest, HttpResponse, TrafficRecorder, Transport};
use tracing::debug;
use url::Url;

use crate::engine::ResilientClient;
use crate::errors::FetchError;

/// Drives which page is requested next and whether there is one
pub trait Paginator: Send {
    /// Back to the first page
    fn reset(&mut self);

    /// Point `request` at the current page
    fn prepare(&mut self, request: &mut HttpRequest);

    /// Learn from a fetched page where the next one is
    fn inspect(&mut self, response: &HttpResponse) -> Result<(), FetchError>;

    fn has_more(&self) -> bool;
}

/// Page number in the query string, next page taken from `Link: rel="next"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPaginator {
    page_param: String,
    first_page: u64,
    page_size: Option<(String, u64)>,
    page: u64,
    pages_fetched: u64,
    more: bool,
}

impl LinkPaginator {
    pub fn new(page_param: impl Into<String>, first_page: u64) -> Self {
        Self {
            page_param: page_param.into(),
            first_page,
            page_size: None,
            page: first_page,
            pages_fetched: 0,
            more: true,
        }
    }

    /// Also send a fixed page size
    pub fn with_page_size(mut self, param: impl Into<String>, size: u64) -> Self {
        self.page_size = Some((param.into(), size));
        self
    }

    /// Page that the next request asks for
    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    fn next_page_from(&self, response: &HttpResponse, link: &str) -> Result<Option<u64>, FetchError> {
        let next = match Url::parse(&response.url).and_then(|base| base.join(link)) {
            Ok(next) => next,
            Err(e) => {
                debug!("Ignoring unparsable next link {}: {}", link, e);
                return Ok(None);
            }
        };

        let values: Vec<String> = next
            .query_pairs()
            .filter(|(name, _)| name == self.page_param.as_str())
            .map(|(_, value)| value.into_owned())
            .collect();
        let [value] = values.as_slice() else {
            return Ok(None);
        };

        let page = value.parse::<u64>().map_err(|_| {
            FetchError::Pagination(format!(
                "Found a link for next page={} (extracted from \"{}\"), but it is not a page number",
                value, link
            ))
        })?;
        if page <= self.page {
            return Err(FetchError::Pagination(format!(
                "Found a link for next page={} (extracted from \"{}\"), but it is less or equal to the current page={}",
                page, link, self.page
            )));
        }
        Ok(Some(page))
    }
}

impl Paginator for LinkPaginator {
    fn reset(&mut self) {
        self.page = self.first_page;
        self.pages_fetched = 0;
        self.more = true;
    }

    fn prepare(&mut self, request: &mut HttpRequest) {
        request.set_query(&self.page_param, self.page.to_string());
        if let Some((param, size)) = &self.page_size {
            request.set_query(param, size.to_string());
        }
    }

    fn inspect(&mut self, response: &HttpResponse) -> Result<(), FetchError> {
        self.pages_fetched += 1;
        self.more = false;

        let Some(link) = header_link(response, "next") else {
            return Ok(());
        };
        if let Some(page) = self.next_page_from(response, &link)? {
            self.page = page;
            self.more = true;
        }
        Ok(())
    }

    fn has_more(&self) -> bool {
        self.more
    }
}

/// Lazy, restartable sequence of pages
pub struct PaginatedFetch<'c, T: Transport, P: Paginator> {
    client: &'c ResilientClient<T>,
    request: HttpRequest,
    paginator: P,
    stopped: bool,
}

impl<'c, T: Transport, P: Paginator> PaginatedFetch<'c, T, P> {
    pub fn new(client: &'c ResilientClient<T>, request: HttpRequest, mut paginator: P) -> Self {
        paginator.reset();
        Self {
            client,
            request,
            paginator,
            stopped: false,
        }
    }

    /// Fetch the next page, or `None` once the last page was seen. After an
    /// error the sequence stays finished until [`reset`](Self::reset).
    pub async fn next_page(
        &mut self,
        recorder: Option<&mut dyn TrafficRecorder>,
    ) -> Option<Result<HttpResponse, FetchError>> {
        if self.stopped || !self.paginator.has_more() {
            return None;
        }

        let mut request = self.request.clone();
        self.paginator.prepare(&mut request);

        let result = match self.client.execute(&request, recorder).await {
            Ok(response) => self.paginator.inspect(&response).map(|_| response),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.stopped = true;
        }
        Some(result)
    }

    /// Start over from the first page
    pub fn reset(&mut self) {
        self.paginator.reset();
        self.stopped = false;
    }

    pub fn paginator(&self) -> &P {
        &self.paginator
    }
}

impl<T: Transport> ResilientClient<T> {
    /// Pages of `request`, fetched one engine invocation at a time
    pub fn paginate<P: Paginator>(&self, request: HttpRequest, paginator: P) -> PaginatedFetch<'_, T, P> {
        PaginatedFetch::new(self, request, paginator)
    }
}
