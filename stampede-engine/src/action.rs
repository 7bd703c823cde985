//! Action catalog and execution
//!
//! An action is one request-style operation a virtual user can perform. Its
//! execution returns an [`ActionResult`] synchronously to the worker loop:
//! the outcomes of every request it issued, whether it was skipped for an
//! unmet precondition, and the resources it created.

use crate::api::{self, Book, ParseError};
use crate::metrics::{ActionOutcome, OutcomeClass};
use crate::resource::{ResourceKind, ResourceTracker};
use crate::session::VirtualUserSession;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stampede_http::{Transport, TransportRequest, TransportResponse};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;
use tracing::debug;

/// Search terms used when a profile does not configure its own
pub const DEFAULT_SEARCH_TERMS: &[&str] = &["javascript", "node", "react", "python", "docker"];

const BOOK_TITLES: &[&str] = &["Clean Code", "Design Patterns", "Refactoring", "Test Driven Development"];

/// Every action a profile can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionId {
    ListBooks,
    ViewBook,
    SearchBooks,
    ListMyBooks,
    CreateBook,
    UpdateBook,
    CreateBorrow,
    ApproveBorrow,
    ReturnBorrow,
    ListBorrows,
    ViewMyBorrows,
    ViewNotifications,
    MarkNotificationRead,
    HealthCheck,
    JourneyBrowse,
    JourneyViewDetails,
    JourneyBorrow,
    JourneyCheckNotifications,
    JourneyMyBorrows,
}

impl ActionId {
    pub fn name(&self) -> &'static str {
        match self {
            ActionId::ListBooks => "list-books",
            ActionId::ViewBook => "view-book",
            ActionId::SearchBooks => "search-books",
            ActionId::ListMyBooks => "list-my-books",
            ActionId::CreateBook => "create-book",
            ActionId::UpdateBook => "update-book",
            ActionId::CreateBorrow => "create-borrow",
            ActionId::ApproveBorrow => "approve-borrow",
            ActionId::ReturnBorrow => "return-borrow",
            ActionId::ListBorrows => "list-borrows",
            ActionId::ViewMyBorrows => "view-my-borrows",
            ActionId::ViewNotifications => "view-notifications",
            ActionId::MarkNotificationRead => "mark-notification-read",
            ActionId::HealthCheck => "health-check",
            ActionId::JourneyBrowse => "journey-browse",
            ActionId::JourneyViewDetails => "journey-view-details",
            ActionId::JourneyBorrow => "journey-borrow",
            ActionId::JourneyCheckNotifications => "journey-check-notifications",
            ActionId::JourneyMyBorrows => "journey-my-borrows",
        }
    }

    pub fn all() -> &'static [ActionId] {
        &[
            ActionId::ListBooks,
            ActionId::ViewBook,
            ActionId::SearchBooks,
            ActionId::ListMyBooks,
            ActionId::CreateBook,
            ActionId::UpdateBook,
            ActionId::CreateBorrow,
            ActionId::ApproveBorrow,
            ActionId::ReturnBorrow,
            ActionId::ListBorrows,
            ActionId::ViewMyBorrows,
            ActionId::ViewNotifications,
            ActionId::MarkNotificationRead,
            ActionId::HealthCheck,
            ActionId::JourneyBrowse,
            ActionId::JourneyViewDetails,
            ActionId::JourneyBorrow,
            ActionId::JourneyCheckNotifications,
            ActionId::JourneyMyBorrows,
        ]
    }

    /// Resource type that must already exist for this action to run
    pub fn depends_on(&self) -> Option<ResourceKind> {
        match self {
            ActionId::UpdateBook => Some(ResourceKind::Book),
            ActionId::ApproveBorrow | ActionId::ReturnBorrow => Some(ResourceKind::Borrow),
            ActionId::MarkNotificationRead => Some(ResourceKind::Notification),
            _ => None,
        }
    }

    /// Reads whose latency feeds the cache hit/miss classifier
    pub fn cache_probe(&self) -> bool {
        matches!(
            self,
            ActionId::ListBooks
                | ActionId::ViewBook
                | ActionId::SearchBooks
                | ActionId::JourneyBrowse
                | ActionId::JourneyViewDetails
        )
    }

    /// Non-2xx statuses that are a normal part of this action's life
    ///
    /// Shared credentials mean a user often acts on a resource it cannot
    /// touch (approving its own request, borrowing its own book).
    pub fn expected_statuses(&self) -> &'static [u16] {
        match self {
            ActionId::CreateBorrow | ActionId::JourneyBorrow => &[400, 403, 409],
            ActionId::ApproveBorrow | ActionId::ReturnBorrow => &[400, 403, 404, 409],
            ActionId::UpdateBook => &[403, 404],
            ActionId::MarkNotificationRead => &[404],
            _ => &[],
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, ActionId::HealthCheck)
    }

    pub fn is_journey_step(&self) -> bool {
        matches!(
            self,
            ActionId::JourneyBrowse
                | ActionId::JourneyViewDetails
                | ActionId::JourneyBorrow
                | ActionId::JourneyCheckNotifications
                | ActionId::JourneyMyBorrows
        )
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionId::all()
            .iter()
            .find(|id| id.name() == s)
            .copied()
            .ok_or_else(|| format!("unknown action '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    Independent,
    SequentialStep,
}

/// Immutable description of an action within a profile
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    /// Metric label; defaults to the catalog name
    pub name: String,
    pub action: ActionId,
    pub weight: u32,
    pub kind: ActionKind,
    pub depends_on: Option<ResourceKind>,
    pub cache_probe: bool,
    pub expected_statuses: Vec<u16>,
    pub search_terms: Vec<String>,
}

impl ActionSpec {
    pub fn new(action: ActionId, weight: u32) -> Self {
        Self {
            name: action.name().to_string(),
            action,
            weight,
            kind: ActionKind::Independent,
            depends_on: action.depends_on(),
            cache_probe: action.cache_probe(),
            expected_statuses: action.expected_statuses().to_vec(),
            search_terms: Vec::new(),
        }
    }

    /// An ordered journey step
    pub fn step(action: ActionId) -> Self {
        Self {
            kind: ActionKind::SequentialStep,
            ..Self::new(action, 1)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_search_terms(mut self, terms: &[&str]) -> Self {
        self.search_terms = terms.iter().map(|t| t.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No tracked resource of the needed type yet
    NoResource(ResourceKind),
    /// The candidate listing could not be fetched
    ListingUnavailable,
    /// The listing held nothing matching the action's filter
    NoCandidates,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoResource(kind) => write!(f, "no {} created yet", kind),
            SkipReason::ListingUnavailable => write!(f, "listing unavailable"),
            SkipReason::NoCandidates => write!(f, "no matching candidates"),
        }
    }
}

/// Resource id produced by an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResource {
    pub kind: ResourceKind,
    pub id: String,
    /// Found in a response rather than created; may already be tracked
    pub discovered: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    pub outcomes: Vec<ActionOutcome>,
    pub skipped: Option<SkipReason>,
    pub created: Vec<NewResource>,
}

impl ActionResult {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    fn skip(&mut self, reason: SkipReason) {
        self.skipped = Some(reason);
    }
}

/// Scratch state carried between the steps of one journey
#[derive(Debug, Clone, Default)]
pub struct JourneyState {
    pub listing: Option<Vec<Book>>,
    pub chosen: Option<Book>,
}

/// Everything an action may touch while executing
pub struct ActionContext<'a> {
    pub transport: &'a dyn Transport,
    pub session: &'a VirtualUserSession,
    pub tracker: &'a ResourceTracker,
    pub rng: &'a mut StdRng,
    pub journey: &'a mut JourneyState,
}

impl ActionContext<'_> {
    /// Issue one request and record its outcome. Returns the response only
    /// when it was a success, for the caller to decode.
    async fn call(
        &mut self,
        spec: &ActionSpec,
        label: &str,
        request: TransportRequest,
        result: &mut ActionResult,
    ) -> Option<TransportResponse> {
        let request = if spec.action.requires_auth() {
            self.session.authorize(request)
        } else {
            request
        };

        let started = Instant::now();
        match self.transport.send(request).await {
            Ok(response) => {
                let classification = OutcomeClass::from_status(
                    response.status,
                    &spec.expected_statuses,
                    self.session.state(),
                );
                result.outcomes.push(ActionOutcome {
                    action_name: spec.name.clone(),
                    request: label.to_string(),
                    status: Some(response.status),
                    latency: response.latency,
                    classification,
                    parse_failed: false,
                    error: None,
                });
                response.is_success().then_some(response)
            }
            Err(e) => {
                debug!(action = %spec.name, error = %e, "Transport failure");
                result.outcomes.push(ActionOutcome {
                    action_name: spec.name.clone(),
                    request: label.to_string(),
                    status: None,
                    latency: started.elapsed(),
                    classification: OutcomeClass::UnexpectedFailure,
                    parse_failed: false,
                    error: Some(e.to_string()),
                });
                None
            }
        }
    }

    async fn listing(&mut self, spec: &ActionSpec, result: &mut ActionResult) -> Option<Vec<Book>> {
        let response = self
            .call(spec, "GET /books", TransportRequest::get("/books"), result)
            .await?;
        decoded(spec, result, api::parse_books(&response.body))
    }

    async fn notifications(&mut self, spec: &ActionSpec, result: &mut ActionResult) {
        let Some(response) = self
            .call(spec, "GET /notifications", TransportRequest::get("/notifications"), result)
            .await
        else {
            return;
        };
        if let Some(notifications) = decoded(spec, result, api::parse_notifications(&response.body)) {
            result.created.extend(notifications.into_iter().filter(|n| !n.read).map(|n| NewResource {
                kind: ResourceKind::Notification,
                id: n.id,
                discovered: true,
            }));
        }
    }

    async fn borrow(&mut self, spec: &ActionSpec, book_id: &str, result: &mut ActionResult) {
        let start = Utc::now().date_naive();
        let end = start + chrono::Duration::days(7);
        let request = TransportRequest::post(
            "/borrows",
            json!({
                "bookId": book_id,
                "startDate": start.format("%Y-%m-%d").to_string(),
                "endDate": end.format("%Y-%m-%d").to_string(),
            }),
        );
        if let Some(response) = self.call(spec, "POST /borrows", request, result).await {
            if let Some(id) = decoded(spec, result, api::parse_created_id(&response.body, &["borrow", "data"])) {
                result.created.push(NewResource {
                    kind: ResourceKind::Borrow,
                    id,
                    discovered: false,
                });
            }
        }
    }

    fn search_term(&mut self, spec: &ActionSpec) -> String {
        let term = if spec.search_terms.is_empty() {
            DEFAULT_SEARCH_TERMS.choose(&mut *self.rng).map(|t| t.to_string())
        } else {
            spec.search_terms.choose(&mut *self.rng).cloned()
        };
        term.unwrap_or_default()
    }
}

/// Mark the last outcome as a parse failure when `parsed` is an error
fn decoded<T>(spec: &ActionSpec, result: &mut ActionResult, parsed: Result<T, ParseError>) -> Option<T> {
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(action = %spec.name, error = %e, "Unparseable response body");
            if let Some(last) = result.outcomes.last_mut() {
                last.parse_failed = true;
            }
            None
        }
    }
}

/// Perform `spec` once
pub async fn execute(spec: &ActionSpec, ctx: &mut ActionContext<'_>) -> ActionResult {
    let mut result = ActionResult::default();

    if let Some(kind) = spec.depends_on {
        if ctx.tracker.is_empty(kind) {
            return ActionResult::skipped(SkipReason::NoResource(kind));
        }
    }

    match spec.action {
        ActionId::ListBooks => {
            ctx.call(spec, "GET /books", TransportRequest::get("/books"), &mut result)
                .await;
        }

        ActionId::ViewBook => {
            let Some(books) = ctx.listing(spec, &mut result).await else {
                result.skip(SkipReason::ListingUnavailable);
                return result;
            };
            let Some(book) = books.choose(&mut *ctx.rng) else {
                result.skip(SkipReason::NoCandidates);
                return result;
            };
            let request = TransportRequest::get(format!("/books/{}", book.id));
            ctx.call(spec, "GET /books/:id", request, &mut result).await;
        }

        ActionId::SearchBooks => {
            let term = ctx.search_term(spec);
            let encoded: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();
            let request = TransportRequest::get(format!("/books/search?q={}", encoded));
            ctx.call(spec, "GET /books/search", request, &mut result).await;
        }

        ActionId::ListMyBooks => {
            let request = TransportRequest::get("/books/my-books");
            ctx.call(spec, "GET /books/my-books", request, &mut result).await;
        }

        ActionId::CreateBook => {
            let title = BOOK_TITLES.choose(&mut *ctx.rng).copied().unwrap_or("Load Test Book");
            let number: u32 = ctx.rng.random_range(1..=10_000);
            let request = TransportRequest::post(
                "/books",
                json!({
                    "title": format!("{} {}", title, number),
                    "authors": ["Load Test"],
                    "description": "Created by stampede",
                }),
            );
            if let Some(response) = ctx.call(spec, "POST /books", request, &mut result).await {
                if let Some(id) = decoded(spec, &mut result, api::parse_created_id(&response.body, &["book", "data"])) {
                    result.created.push(NewResource {
                        kind: ResourceKind::Book,
                        id,
                        discovered: false,
                    });
                }
            }
        }

        ActionId::UpdateBook => {
            let Some(book) = ctx.tracker.sample_one(ResourceKind::Book, &mut *ctx.rng) else {
                result.skip(SkipReason::NoResource(ResourceKind::Book));
                return result;
            };
            let request = TransportRequest::put(format!("/books/{}", book.id))
                .with_body(json!({ "description": format!("Updated {}", Utc::now().to_rfc3339()) }));
            ctx.call(spec, "PUT /books/:id", request, &mut result).await;
        }

        ActionId::CreateBorrow => {
            let Some(books) = ctx.listing(spec, &mut result).await else {
                result.skip(SkipReason::ListingUnavailable);
                return result;
            };
            let available: Vec<&Book> = books.iter().filter(|b| b.is_available()).collect();
            let Some(book) = available.choose(&mut *ctx.rng) else {
                result.skip(SkipReason::NoCandidates);
                return result;
            };
            let book_id = book.id.clone();
            ctx.borrow(spec, &book_id, &mut result).await;
        }

        ActionId::ApproveBorrow | ActionId::ReturnBorrow => {
            let Some(borrow) = ctx.tracker.sample_one(ResourceKind::Borrow, &mut *ctx.rng) else {
                result.skip(SkipReason::NoResource(ResourceKind::Borrow));
                return result;
            };
            let (label, verb) = match spec.action {
                ActionId::ApproveBorrow => ("PUT /borrows/:id/accept", "accept"),
                _ => ("PUT /borrows/:id/return", "return"),
            };
            let request = TransportRequest::put(format!("/borrows/{}/{}", borrow.id, verb));
            ctx.call(spec, label, request, &mut result).await;
        }

        ActionId::ListBorrows => {
            ctx.call(spec, "GET /borrows", TransportRequest::get("/borrows"), &mut result)
                .await;
        }

        ActionId::ViewMyBorrows | ActionId::JourneyMyBorrows => {
            let request = TransportRequest::get("/borrows/my-borrows");
            ctx.call(spec, "GET /borrows/my-borrows", request, &mut result).await;
        }

        ActionId::ViewNotifications | ActionId::JourneyCheckNotifications => {
            ctx.notifications(spec, &mut result).await;
        }

        ActionId::MarkNotificationRead => {
            let Some(notification) = ctx.tracker.sample_one(ResourceKind::Notification, &mut *ctx.rng) else {
                result.skip(SkipReason::NoResource(ResourceKind::Notification));
                return result;
            };
            let request = TransportRequest::put(format!("/notifications/{}/read", notification.id));
            ctx.call(spec, "PUT /notifications/:id/read", request, &mut result).await;
        }

        ActionId::HealthCheck => {
            ctx.call(spec, "GET /health", TransportRequest::get("/health"), &mut result)
                .await;
        }

        ActionId::JourneyBrowse => {
            ctx.journey.chosen = None;
            ctx.journey.listing = ctx.listing(spec, &mut result).await;
        }

        ActionId::JourneyViewDetails => {
            let chosen = ctx
                .journey
                .listing
                .as_deref()
                .and_then(|books| books.choose(&mut *ctx.rng))
                .cloned();
            let Some(book) = chosen else {
                result.skip(SkipReason::NoCandidates);
                return result;
            };
            let request = TransportRequest::get(format!("/books/{}", book.id));
            ctx.journey.chosen = Some(book);
            ctx.call(spec, "GET /books/:id", request, &mut result).await;
        }

        ActionId::JourneyBorrow => {
            let Some(book_id) = ctx
                .journey
                .chosen
                .as_ref()
                .filter(|book| book.is_available())
                .map(|book| book.id.clone())
            else {
                result.skip(SkipReason::NoCandidates);
                return result;
            };
            ctx.borrow(spec, &book_id, &mut result).await;
        }
    }

    result
}
