// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Turns list RPCs into lazy, resumable sequences.
//!
//! List RPCs follow [AIP-158]: the request carries a `page_token`, the
//! response carries a `next_page_token` and a repeated field with the items.
//! An empty `next_page_token` marks the last page.
//!
//! A [Paginator] fetches one page per draw, an [ItemPaginator] flattens the
//! pages into individual items. Both can be converted to a
//! [futures::Stream].
//!
//! # Example
//! ```
//! # use aiplatform_gax::call_runner::CallRunner;
//! # use aiplatform_gax::options::RequestOptions;
//! # use aiplatform_gax::paginator::{PageableRequest, PageableResponse};
//! #[derive(Clone, serde::Serialize)]
//! struct ListDatasetsRequest { parent: String, page_token: String }
//! impl PageableRequest for ListDatasetsRequest {
//!     fn page_token(&self) -> &str { &self.page_token }
//!     fn set_page_token(&mut self, token: String) { self.page_token = token; }
//! }
//! #[derive(serde::Deserialize)]
//! struct ListDatasetsResponse { datasets: Vec<String>, next_page_token: String }
//! impl PageableResponse for ListDatasetsResponse {
//!     type PageItem = String;
//!     fn next_page_token(&self) -> String { self.next_page_token.clone() }
//!     fn into_items(self) -> Vec<String> { self.datasets }
//! }
//! # async fn sample(runner: &CallRunner) -> aiplatform_gax::Result<()> {
//! let request = ListDatasetsRequest { parent: "projects/p/locations/l".into(), page_token: String::new() };
//! let mut items = runner
//!     .paginate::<_, ListDatasetsResponse>(
//!         "/google.cloud.aiplatform.v1.DatasetService/ListDatasets",
//!         request,
//!         RequestOptions::default())
//!     .items();
//! while let Some(dataset) = items.next().await {
//!     println!("{}", dataset?);
//! }
//! # Ok(()) }
//! ```
//!
//! [AIP-158]: https://google.aip.dev/158

use crate::Result;
use crate::call_runner::CallRunner;
use crate::error::Error;
use crate::options::RequestOptions;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt, unfold};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

/// Describes a list response that can be used with [Paginator].
pub trait PageableResponse {
    type PageItem: Send;

    /// The token for the next page, empty on the last page.
    fn next_page_token(&self) -> String;

    /// Consumes the response, returning the items in this page.
    fn into_items(self) -> Vec<Self::PageItem>;
}

/// Describes a list request that can be used with [CallRunner::paginate].
pub trait PageableRequest {
    /// The page token in this request, empty for the first page.
    fn page_token(&self) -> &str;

    fn set_page_token(&mut self, token: String);
}

/// Fetches the page identified by a token.
pub type ListFn<Resp> = Box<dyn Fn(String) -> BoxFuture<'static, Result<Resp>> + Send + Sync>;

#[derive(Debug)]
enum State {
    Next(String),
    Done,
    Poisoned(Error),
}

/// An adapter that converts list RPCs into a sequence of pages.
///
/// Each call to [next_page][Paginator::next_page] issues at most one RPC. Any
/// error poisons the paginator, later draws return the same error. Dropping
/// a draw while its RPC is in flight also poisons the paginator, with a
/// [cancelled][Error::is_cancelled] error.
pub struct Paginator<Resp> {
    list: ListFn<Resp>,
    state: State,
}

impl<Resp> std::fmt::Debug for Paginator<Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("state", &self.state)
            .finish()
    }
}

impl<Resp> Paginator<Resp>
where
    Resp: PageableResponse + Send + 'static,
{
    /// Creates a new [Paginator] given the initial page token and a function
    /// to fetch each [PageableResponse].
    ///
    /// An empty seed token starts from the first page.
    pub fn new<F, Fut>(seed_token: impl Into<String>, list: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        Self {
            list: Box::new(move |token| Box::pin(list(token))),
            state: State::Next(seed_token.into()),
        }
    }

    /// The token to resume the traversal after the last page returned.
    ///
    /// Returns `None` once the traversal is complete or failed. A new
    /// paginator seeded with this token continues where this one stopped.
    pub fn next_page_token(&self) -> Option<&str> {
        match &self.state {
            State::Next(token) => Some(token),
            State::Done | State::Poisoned(_) => None,
        }
    }

    /// Fetches the next page.
    ///
    /// Returns `None` after the last page.
    pub async fn next_page(&mut self) -> Option<Result<Resp>> {
        let dropped = Error::cancelled("a page fetch was dropped before it completed");
        let token = match std::mem::replace(&mut self.state, State::Poisoned(dropped)) {
            State::Next(token) => token,
            State::Done => {
                self.state = State::Done;
                return None;
            }
            State::Poisoned(e) => {
                self.state = State::Poisoned(e.clone());
                return Some(Err(e));
            }
        };
        match (self.list)(token).await {
            Ok(page) => {
                let next = page.next_page_token();
                self.state = if next.is_empty() {
                    State::Done
                } else {
                    State::Next(next)
                };
                Some(Ok(page))
            }
            Err(e) => {
                tracing::debug!(error = %e, "list RPC failed, the paginator is poisoned");
                self.state = State::Poisoned(e.clone());
                Some(Err(e))
            }
        }
    }

    /// Converts the paginator into a sequence of items.
    pub fn items(self) -> ItemPaginator<Resp> {
        ItemPaginator {
            pages: self,
            buffer: VecDeque::new(),
        }
    }

    /// Converts the paginator into a [futures::Stream] of pages.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> BoxStream<'static, Result<Resp>> {
        unfold(Some(self), |state| async move {
            let mut pages = state?;
            let page = pages.next_page().await?;
            let next = page.is_ok().then_some(pages);
            Some((page, next))
        })
        .boxed()
    }
}

/// Flattens the pages of a [Paginator] into items.
///
/// Items are returned in the order of the page, and pages in the order
/// returned by the service.
pub struct ItemPaginator<Resp: PageableResponse> {
    pages: Paginator<Resp>,
    buffer: VecDeque<Resp::PageItem>,
}

impl<Resp> std::fmt::Debug for ItemPaginator<Resp>
where
    Resp: PageableResponse,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemPaginator")
            .field("pages", &self.pages)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl<Resp> ItemPaginator<Resp>
where
    Resp: PageableResponse + Send + 'static,
{
    /// Returns the next item, fetching pages as needed.
    ///
    /// Empty pages with a non-empty `next_page_token` are skipped.
    pub async fn next(&mut self) -> Option<Result<Resp::PageItem>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            match self.pages.next_page().await? {
                Ok(page) => self.buffer.extend(page.into_items()),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Converts the paginator into a [futures::Stream] of items.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> BoxStream<'static, Result<Resp::PageItem>>
    where
        Resp::PageItem: 'static,
    {
        unfold(Some(self), |state| async move {
            let mut items = state?;
            let item = items.next().await?;
            let next = item.is_ok().then_some(items);
            Some((item, next))
        })
        .boxed()
    }
}

impl CallRunner {
    /// Creates a [Paginator] for a typed list RPC.
    ///
    /// The traversal starts at the page token in `request`. List RPCs are
    /// idempotent unless `options` say otherwise.
    pub fn paginate<Req, Resp>(
        &self,
        method: impl Into<String>,
        request: Req,
        options: RequestOptions,
    ) -> Paginator<Resp>
    where
        Req: PageableRequest + Serialize + Clone + Send + Sync + 'static,
        Resp: PageableResponse + DeserializeOwned + Send + 'static,
    {
        let runner = self.clone();
        let method: Arc<str> = Arc::from(method.into());
        let mut options = options;
        options.set_default_idempotency(true);
        let seed = request.page_token().to_string();
        Paginator::new(seed, move |token| {
            let mut request = request.clone();
            request.set_page_token(token);
            let runner = runner.clone();
            let method = method.clone();
            let options = options.clone();
            async move { runner.execute(&method, &request, options).await }
        })
    }
}

/// A page of a list RPC with opaque JSON payloads.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct Page {
    pub items: Vec<Value>,
    pub next_page_token: String,
}

impl PageableResponse for Page {
    type PageItem = Value;

    fn next_page_token(&self) -> String {
        self.next_page_token.clone()
    }

    fn into_items(self) -> Vec<Value> {
        self.items
    }
}

impl Paginator<Page> {
    /// Creates a [Paginator] for a list RPC with opaque JSON payloads.
    ///
    /// `extract` splits each response into its items and the next page
    /// token. `set_token` returns a copy of the request for the given page
    /// token. The traversal starts at the `page_token` field of `request`,
    /// if present.
    ///
    /// # Example
    /// ```
    /// # use aiplatform_gax::call_runner::CallRunner;
    /// # use aiplatform_gax::options::RequestOptions;
    /// # use aiplatform_gax::paginator::{Paginator, items_field, set_page_token_field};
    /// # async fn sample(runner: &CallRunner) -> aiplatform_gax::Result<()> {
    /// let mut items = Paginator::with_extractor(
    ///     runner,
    ///     "/google.cloud.aiplatform.v1.ModelService/ListModels",
    ///     serde_json::json!({"parent": "projects/p/locations/l", "page_size": 100}),
    ///     RequestOptions::default(),
    ///     items_field("models"),
    ///     set_page_token_field,
    /// ).items();
    /// while let Some(model) = items.next().await {
    ///     println!("{}", model?);
    /// }
    /// # Ok(()) }
    /// ```
    pub fn with_extractor<E, S>(
        runner: &CallRunner,
        method: impl Into<String>,
        request: Value,
        options: RequestOptions,
        extract: E,
        set_token: S,
    ) -> Self
    where
        E: Fn(Value) -> Result<(Vec<Value>, String)> + Send + Sync + 'static,
        S: Fn(Value, String) -> Value + Send + Sync + 'static,
    {
        let runner = runner.clone();
        let method: Arc<str> = Arc::from(method.into());
        let mut options = options;
        options.set_default_idempotency(true);
        let seed = request
            .get(PAGE_TOKEN)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let extract = Arc::new(extract);
        Paginator::new(seed, move |token| {
            let request = set_token(request.clone(), token);
            let runner = runner.clone();
            let method = method.clone();
            let options = options.clone();
            let extract = extract.clone();
            async move {
                let response = runner.invoke(&method, request, options).await?;
                let (items, next_page_token) = extract(response)?;
                Ok(Page {
                    items,
                    next_page_token,
                })
            }
        })
    }
}

const PAGE_TOKEN: &str = "page_token";
const NEXT_PAGE_TOKEN: &str = "next_page_token";

/// Returns an extractor for responses with the items in `field`.
///
/// A missing items field is an empty page, a missing `next_page_token` is
/// the last page.
pub fn items_field(
    field: &str,
) -> impl Fn(Value) -> Result<(Vec<Value>, String)> + Send + Sync + 'static {
    let field = field.to_string();
    move |mut response| {
        let items = match response.get_mut(&field).map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::deser(format!(
                    "expected an array in field {field}, got {other}"
                )));
            }
        };
        let token = match response.get(NEXT_PAGE_TOKEN) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(t)) => t.clone(),
            Some(other) => {
                return Err(Error::deser(format!(
                    "expected a string in {NEXT_PAGE_TOKEN}, got {other}"
                )));
            }
        };
        Ok((items, token))
    }
}

/// Sets the `page_token` field of a JSON request.
pub fn set_page_token_field(mut request: Value, token: String) -> Value {
    if let Some(object) = request.as_object_mut() {
        object.insert(PAGE_TOKEN.to_string(), Value::String(token));
    }
    request
}
