//! A stub cart backend speaking the REST contract over real HTTP.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use cartsync::CartApiConfig;
use cartsync::remote::{AddLineRequest, BulkDeleteRequest, InvalidItemRef, UpdateLineRequest};
use cartsync_core::{CartLineItem, LineId, ProductId, VariantSelection};

#[derive(Default)]
struct StubState {
    lines: Vec<CartLineItem>,
    next_line: u64,
    invalid: Vec<InvalidItemRef>,
    products: HashMap<String, Value>,
    requests: Vec<String>,
    fail_status: Option<u16>,
}

#[derive(Clone)]
struct Stub {
    token: Arc<str>,
    state: Arc<Mutex<StubState>>,
}

impl Stub {
    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap()
    }

    fn record(&self, request: &str) {
        self.lock().requests.push(request.to_owned());
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let expected = format!("Bearer {}", self.token);
        match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(value) if value == expected => Ok(()),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    /// Authorize a mutation and apply any injected failure.
    fn mutation(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        self.authorize(headers)?;
        match self.lock().fail_status {
            Some(status) => Err(StatusCode::from_u16(status).unwrap()),
            None => Ok(()),
        }
    }
}

/// A running stub backend; stops with the test runtime.
pub struct StubServer {
    pub base_url: Url,
    stub: Stub,
}

impl StubServer {
    /// Serve the stub on an ephemeral port, accepting `token` as the only session.
    pub async fn start(token: &str) -> Self {
        let stub = Stub {
            token: Arc::from(token),
            state: Arc::default(),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new().nest("/api", routes()).with_state(stub.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}/api/")).unwrap(),
            stub,
        }
    }

    /// Client configuration for this server, optionally with a session token.
    #[must_use]
    pub fn config(&self, token: Option<&str>) -> CartApiConfig {
        let mut config = CartApiConfig::new(self.base_url.clone());
        config.session_token = token.map(SecretString::from);
        config
    }

    /// Requests received so far, as `METHOD /path`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.stub.lock().requests.clone()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<CartLineItem> {
        self.stub.lock().lines.clone()
    }

    pub fn add_product(&self, id: i64, name: &str, price: &str) {
        self.stub.lock().products.insert(
            id.to_string(),
            json!({ "id": id, "name": name, "price": price, "currency": "USD" }),
        );
    }

    pub fn set_invalid(&self, refs: Vec<InvalidItemRef>) {
        self.stub.lock().invalid = refs;
    }

    /// Answer every mutation with `status` until cleared with `None`.
    pub fn fail_mutations(&self, status: Option<u16>) {
        self.stub.lock().fail_status = status;
    }
}

fn routes() -> Router<Stub> {
    Router::new()
        .route("/session-user", get(session_user))
        .route("/cart", get(fetch).post(add))
        .route("/cart/validate", get(validate))
        .route("/cart/bulk-delete", post(bulk_delete))
        .route("/cart/clear", post(clear))
        .route("/cart/{line_id}", put(update).delete(remove))
        .route("/products/{product_id}", get(product))
}

async fn session_user(
    State(stub): State<Stub>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    stub.record("GET /session-user");
    stub.authorize(&headers)?;
    // Numeric ids, as some backends send them.
    Ok(Json(json!({ "id": 1, "email": "shopper@example.com" })))
}

async fn fetch(State(stub): State<Stub>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    stub.record("GET /cart");
    stub.authorize(&headers)?;
    let lines = stub.lock().lines.clone();
    Ok(Json(json!({ "items": lines, "currency": "USD" })))
}

async fn add(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(request): Json<AddLineRequest>,
) -> Result<StatusCode, StatusCode> {
    stub.record("POST /cart");
    stub.mutation(&headers)?;

    let mut state = stub.lock();
    if let Some(line) = state.lines.iter_mut().find(|line| {
        line.product_id == request.product_id && line.variant_id() == request.variant_id.as_ref()
    }) {
        line.quantity += request.quantity;
        return Ok(StatusCode::OK);
    }

    state.next_line += 1;
    let id = LineId::new(format!("srv-{}", state.next_line));
    let product = state
        .products
        .get(request.product_id.as_str())
        .and_then(|value| {
            serde_json::from_value::<cartsync::remote::CatalogProduct>(value.clone()).ok()
        })
        .map(Into::into);
    state.lines.push(CartLineItem {
        id,
        product_id: request.product_id,
        quantity: request.quantity,
        variant: request.variant_id.map(VariantSelection::by_id),
        product,
    });
    Ok(StatusCode::CREATED)
}

async fn update(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Path(line_id): Path<String>,
    Json(request): Json<UpdateLineRequest>,
) -> Result<StatusCode, StatusCode> {
    stub.record(&format!("PUT /cart/{line_id}"));
    stub.mutation(&headers)?;
    if request.quantity == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut state = stub.lock();
    let line = state
        .lines
        .iter_mut()
        .find(|line| line.id.as_str() == line_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    line.quantity = request.quantity;
    Ok(StatusCode::OK)
}

async fn remove(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Path(line_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    stub.record(&format!("DELETE /cart/{line_id}"));
    stub.mutation(&headers)?;
    let mut state = stub.lock();
    let before = state.lines.len();
    state.lines.retain(|line| line.id.as_str() != line_id);
    if state.lines.len() == before {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_delete(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<StatusCode, StatusCode> {
    stub.record("POST /cart/bulk-delete");
    stub.mutation(&headers)?;
    stub.lock()
        .lines
        .retain(|line| !request.line_ids.contains(&line.id));
    Ok(StatusCode::NO_CONTENT)
}

async fn clear(State(stub): State<Stub>, headers: HeaderMap) -> Result<StatusCode, StatusCode> {
    stub.record("POST /cart/clear");
    stub.mutation(&headers)?;
    stub.lock().lines.clear();
    Ok(StatusCode::NO_CONTENT)
}

async fn validate(
    State(stub): State<Stub>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    stub.record("GET /cart/validate");
    stub.authorize(&headers)?;
    let invalid = stub.lock().invalid.clone();
    Ok(Json(json!({ "invalidItems": invalid })))
}

async fn product(
    State(stub): State<Stub>,
    Path(product_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    stub.record(&format!("GET /products/{product_id}"));
    let found = stub.lock().products.get(&product_id).cloned();
    found.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Shorthand for an invalid-item reference by product.
#[must_use]
pub fn invalid_product(product_id: i64) -> InvalidItemRef {
    InvalidItemRef {
        product_id: ProductId::from(product_id),
        variant_id: None,
        line_id: None,
    }
}
