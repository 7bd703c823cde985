//! In-process stand-in for the book lending API
//!
//! Serves the routes virtual users exercise over real HTTP, keeps just
//! enough state for the borrow lifecycle to behave like the real service,
//! and counts what it saw so tests can assert on traffic.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const TOKEN_PREFIX: &str = "stub-token-";

type Reply = (StatusCode, Json<Value>);

#[derive(Debug, Clone)]
struct StubBook {
    id: String,
    title: String,
    available: bool,
}

impl StubBook {
    fn to_json(&self) -> Value {
        json!({ "_id": self.id, "title": self.title, "available": self.available })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BorrowStatus {
    Pending,
    Accepted,
    Returned,
}

#[derive(Debug, Clone)]
struct StubBorrow {
    id: String,
    book_id: String,
    status: BorrowStatus,
}

#[derive(Debug, Default)]
struct Library {
    books: Vec<StubBook>,
    borrows: HashMap<String, StubBorrow>,
    notifications: Vec<(String, bool)>,
    next_id: u64,
    requests: usize,
    logins: usize,
    rate_limited_logins: usize,
}

impl Library {
    fn seeded() -> Self {
        let mut library = Self::default();
        for title in ["The Rust Programming Language", "Dune", "Neuromancer", "Snow Crash", "Hyperion"] {
            let id = library.fresh_id("book");
            library.books.push(StubBook {
                id,
                title: title.to_string(),
                available: true,
            });
        }
        library
    }

    fn fresh_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", kind, self.next_id)
    }

    fn book_mut(&mut self, id: &str) -> Option<&mut StubBook> {
        self.books.iter_mut().find(|b| b.id == id)
    }
}

type Shared = Arc<Mutex<Library>>;

fn reply(status: StatusCode, body: Value) -> Reply {
    (status, Json(body))
}

fn not_found() -> Reply {
    reply(StatusCode::NOT_FOUND, json!({ "message": "not found" }))
}

/// Count the request and reject it unless it carries a stub-issued bearer token
fn admit(state: &Shared, headers: &HeaderMap) -> Result<(), Reply> {
    state.lock().requests += 1;
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.starts_with(TOKEN_PREFIX));
    if authorized {
        Ok(())
    } else {
        Err(reply(StatusCode::UNAUTHORIZED, json!({ "message": "unauthorized" })))
    }
}

async fn login(State(state): State<Shared>) -> Reply {
    let mut library = state.lock();
    library.requests += 1;
    library.logins += 1;
    if library.rate_limited_logins > 0 {
        library.rate_limited_logins -= 1;
        return reply(StatusCode::TOO_MANY_REQUESTS, json!({ "retryAfter": 0 }));
    }
    let token = format!("{}{}", TOKEN_PREFIX, library.logins);
    reply(StatusCode::OK, json!({ "accessToken": token }))
}

async fn health(State(state): State<Shared>) -> Reply {
    state.lock().requests += 1;
    reply(StatusCode::OK, json!({ "status": "ok" }))
}

async fn list_books(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let books: Vec<Value> = state.lock().books.iter().map(StubBook::to_json).collect();
    let total = books.len();
    reply(StatusCode::OK, json!({ "books": books, "total": total }))
}

async fn search_books(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let term = params.get("q").map(|q| q.to_lowercase()).unwrap_or_default();
    let books: Vec<Value> = state
        .lock()
        .books
        .iter()
        .filter(|b| b.title.to_lowercase().contains(&term))
        .map(StubBook::to_json)
        .collect();
    reply(StatusCode::OK, json!(books))
}

async fn view_book(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    match state.lock().books.iter().find(|b| b.id == id) {
        Some(book) => reply(StatusCode::OK, book.to_json()),
        None => not_found(),
    }
}

async fn create_book(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let Some(title) = body.get("title").and_then(Value::as_str) else {
        return reply(StatusCode::BAD_REQUEST, json!({ "message": "title is required" }));
    };
    let mut library = state.lock();
    let id = library.fresh_id("book");
    let book = StubBook {
        id,
        title: title.to_string(),
        available: true,
    };
    let created = book.to_json();
    library.books.push(book);
    reply(StatusCode::CREATED, json!({ "book": created }))
}

async fn update_book(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    match state.lock().book_mut(&id) {
        Some(book) => reply(StatusCode::OK, book.to_json()),
        None => not_found(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BorrowRequest {
    book_id: String,
}

async fn create_borrow(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<BorrowRequest>,
) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let mut library = state.lock();
    match library.book_mut(&body.book_id) {
        Some(book) if book.available => book.available = false,
        Some(_) => return reply(StatusCode::CONFLICT, json!({ "message": "book is not available" })),
        None => return not_found(),
    }
    let id = library.fresh_id("borrow");
    library.borrows.insert(
        id.clone(),
        StubBorrow {
            id: id.clone(),
            book_id: body.book_id,
            status: BorrowStatus::Pending,
        },
    );
    let notification = library.fresh_id("notification");
    library.notifications.push((notification, false));
    reply(StatusCode::CREATED, json!({ "borrow": { "_id": id, "status": "pending" } }))
}

async fn list_borrows(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let borrows: Vec<Value> = state
        .lock()
        .borrows
        .values()
        .map(|b| json!({ "_id": b.id, "bookId": b.book_id, "status": format!("{:?}", b.status) }))
        .collect();
    reply(StatusCode::OK, json!({ "borrows": borrows }))
}

async fn accept_borrow(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let mut library = state.lock();
    let Some(borrow) = library.borrows.get_mut(&id) else {
        return not_found();
    };
    if borrow.status != BorrowStatus::Pending {
        return reply(StatusCode::CONFLICT, json!({ "message": "borrow is not pending" }));
    }
    borrow.status = BorrowStatus::Accepted;
    reply(StatusCode::OK, json!({ "_id": id, "status": "accepted" }))
}

async fn return_borrow(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let mut library = state.lock();
    let Some(borrow) = library.borrows.get_mut(&id) else {
        return not_found();
    };
    if borrow.status != BorrowStatus::Accepted {
        return reply(StatusCode::BAD_REQUEST, json!({ "message": "borrow is not active" }));
    }
    borrow.status = BorrowStatus::Returned;
    let book_id = borrow.book_id.clone();
    if let Some(book) = library.book_mut(&book_id) {
        book.available = true;
    }
    reply(StatusCode::OK, json!({ "_id": id, "status": "returned" }))
}

async fn list_notifications(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    let notifications: Vec<Value> = state
        .lock()
        .notifications
        .iter()
        .map(|(id, read)| json!({ "_id": id, "read": read }))
        .collect();
    reply(StatusCode::OK, json!({ "notifications": notifications }))
}

async fn read_notification(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    if let Err(denied) = admit(&state, &headers) {
        return denied;
    }
    match state.lock().notifications.iter_mut().find(|(n, _)| *n == id) {
        Some((_, read)) => {
            *read = true;
            reply(StatusCode::OK, json!({ "_id": id, "read": true }))
        }
        None => not_found(),
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/health", get(health))
        .route("/books", get(list_books).post(create_book))
        .route("/books/search", get(search_books))
        .route("/books/my-books", get(list_books))
        .route("/books/{id}", get(view_book).put(update_book))
        .route("/borrows", get(list_borrows).post(create_borrow))
        .route("/borrows/my-borrows", get(list_borrows))
        .route("/borrows/{id}/accept", put(accept_borrow))
        .route("/borrows/{id}/return", put(return_borrow))
        .route("/notifications", get(list_notifications))
        .route("/notifications/{id}/read", put(read_notification))
        .with_state(state)
}

/// A running stub bound to an ephemeral local port
pub struct BookApi {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl BookApi {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_rate_limited_logins(0).await
    }

    /// Answer the first `count` logins with 429 and a zero retry interval
    pub async fn start_with_rate_limited_logins(count: usize) -> anyhow::Result<Self> {
        let _ = stampede_logging::init_simple_tracing("warn");

        let mut library = Library::seeded();
        library.rate_limited_logins = count;
        let state = Arc::new(Mutex::new(library));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(state.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state, server })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    pub fn logins(&self) -> usize {
        self.state.lock().logins
    }

    pub fn book_count(&self) -> usize {
        self.state.lock().books.len()
    }

    pub fn borrow_count(&self) -> usize {
        self.state.lock().borrows.len()
    }
}

impl Drop for BookApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// An address nothing is listening on
pub async fn closed_address() -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", addr))
}
