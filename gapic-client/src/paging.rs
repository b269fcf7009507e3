//! Lazy pagination over list-style calls.
//!
//! List methods return results a page at a time, each page carrying a token
//! for the next one. [`Pager`] drives that token exchange: it fetches nothing
//! until asked, stops after a page with an empty token, and can be restarted
//! from the first page at any time.
//!
//! Request and response types participate through two small traits:
//! [`PageableRequest`] lets the pager install the next token, and
//! [`PageableResponse`] exposes the token and items of a fetched page.
//!
//! # Example
//!
//! ```ignore
//! let mut pager = client.paged::<ListItemsRequest, ListItemsResponse>(&LIST_ITEMS, request);
//!
//! while let Some(page) = pager.next_page().await {
//!     for item in page?.into_inner().into_items() {
//!         println!("{:?}", item);
//!     }
//! }
//! ```

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::ClientError;
use crate::response::Response;

/// A list request that carries a page token.
pub trait PageableRequest: Clone {
    /// Install the token identifying the page to fetch.
    fn set_page_token(&mut self, token: String);
}

/// A list response that carries a page of items and the next page token.
pub trait PageableResponse {
    /// The resource type listed by this response.
    type Item;

    /// Token for the page after this one; empty when this is the last page.
    fn next_page_token(&self) -> &str;

    /// Extract the items on this page.
    fn into_items(self) -> Vec<Self::Item>;
}

/// Future returned by a page fetch.
pub type PageFuture<'a, Res> = BoxFuture<'a, Result<Response<Res>, ClientError>>;

/// Lazy cursor over the pages of a list call.
///
/// Holds the original request as a template so [`restart`](Pager::restart)
/// can rewind to the first page. The page token only advances when a fetch
/// succeeds, so after an error the same page can be requested again by
/// calling [`next_page`](Pager::next_page) once more.
pub struct Pager<'a, Req, Res> {
    fetch: Box<dyn FnMut(Req) -> PageFuture<'a, Res> + Send + 'a>,
    /// The caller's request, kept pristine for restarts.
    template: Req,
    /// The request for the next fetch, token updated after each page.
    request: Req,
    exhausted: bool,
}

impl<'a, Req, Res> Pager<'a, Req, Res>
where
    Req: PageableRequest,
    Res: PageableResponse,
{
    /// Create a pager that fetches pages with the given function.
    ///
    /// The first fetch sends `request` exactly as passed; later fetches send
    /// a clone with the token from the previous page installed.
    pub fn new<F>(request: Req, fetch: F) -> Self
    where
        F: FnMut(Req) -> PageFuture<'a, Res> + Send + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            template: request.clone(),
            request,
            exhausted: false,
        }
    }

    /// Fetch the next page.
    ///
    /// Returns `None` once a page with an empty token has been yielded. A
    /// returned error does not consume the page; the next call fetches the
    /// same page again.
    pub async fn next_page(&mut self) -> Option<Result<Response<Res>, ClientError>> {
        if self.exhausted {
            return None;
        }

        match (self.fetch)(self.request.clone()).await {
            Ok(response) => {
                let token = response.get_ref().next_page_token().to_string();
                if token.is_empty() {
                    self.exhausted = true;
                } else {
                    self.request.set_page_token(token);
                }
                Some(Ok(response))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Rewind to the first page.
    ///
    /// The next fetch sends the original request again, regardless of how far
    /// iteration had advanced.
    pub fn restart(&mut self) {
        self.request = self.template.clone();
        self.exhausted = false;
    }

    /// Whether the final page has been yielded.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Collect the items of all remaining pages.
    ///
    /// Stops at the first error, which is returned as-is.
    pub async fn all_items(&mut self) -> Result<Vec<Res::Item>, ClientError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await {
            items.extend(page?.into_inner().into_items());
        }
        Ok(items)
    }

    /// Adapt the remaining pages into a stream.
    ///
    /// Each poll fetches at most one page. An error item leaves the page
    /// unconsumed, exactly as [`next_page`](Pager::next_page) does, so the
    /// stream keeps going and the next poll retries the same page.
    pub fn into_page_stream(self) -> BoxStream<'a, Result<Response<Res>, ClientError>>
    where
        Req: Send + 'a,
        Res: Send + 'a,
    {
        Box::pin(futures::stream::unfold(self, |mut pager| async move {
            let page = pager.next_page().await?;
            Some((page, pager))
        }))
    }

    /// Flatten the remaining pages into a stream of items.
    ///
    /// Pages are fetched on demand as the stream is polled.
    pub fn into_item_stream(self) -> BoxStream<'a, Result<Res::Item, ClientError>>
    where
        Req: Send + 'a,
        Res: Send + 'a,
        Res::Item: Send,
    {
        Box::pin(futures::stream::unfold(
            (self, Vec::new().into_iter()),
            |(mut pager, mut items)| async move {
                loop {
                    if let Some(item) = items.next() {
                        return Some((Ok(item), (pager, items)));
                    }
                    match pager.next_page().await? {
                        Ok(page) => {
                            items = page.into_inner().into_items().into_iter();
                        }
                        Err(e) => return Some((Err(e), (pager, items))),
                    }
                }
            },
        ))
    }
}
