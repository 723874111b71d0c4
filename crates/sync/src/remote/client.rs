//! HTTP implementation of the cart backend.

use std::sync::{Arc, PoisonError, RwLock};

use moka::future::Cache;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use cartsync_core::{LineId, ProductId, ProductSnapshot};

use super::types::{
    AddLineRequest, BulkDeleteRequest, CatalogProduct, InvalidItemRef, RemoteCart, SessionUser,
    UpdateLineRequest, ValidateResponse,
};
use super::CartBackend;
use crate::config::CartApiConfig;
use crate::error::{CartError, Result};

/// Longest slice of an error body kept in errors and logs.
const ERROR_BODY_LIMIT: usize = 200;

/// Client for the cart backend's REST API.
///
/// Cheap to clone; clones share the connection pool, session token and
/// catalog cache.
#[derive(Clone)]
pub struct RestCartClient {
    inner: Arc<RestCartClientInner>,
}

struct RestCartClientInner {
    client: reqwest::Client,
    base_url: Url,
    session_token: RwLock<Option<SecretString>>,
    catalog: Cache<ProductId, ProductSnapshot>,
}

impl RestCartClient {
    /// Create a new cart API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CartApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let catalog = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.catalog_cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(RestCartClientInner {
                client,
                base_url: config.base_url.clone(),
                session_token: RwLock::new(config.session_token.clone()),
                catalog,
            }),
        })
    }

    /// Replace the session token, e.g. after the user signs in or out.
    pub fn set_session_token(&self, token: Option<SecretString>) {
        *self
            .inner
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| CartError::Internal(format!("invalid endpoint {path}: {e}")))
    }

    fn line_path(line_id: &LineId) -> String {
        format!("cart/{}", urlencoding::encode(line_id.as_str()))
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let builder = self.inner.client.request(method, self.url(path)?);
        let token = self
            .inner
            .session_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(match token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        })
    }

    /// Send a request and map the status onto the cart error taxonomy.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(status = %status, "Cart backend rejected the session");
            return Err(CartError::LoginRequired);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = body.chars().take(ERROR_BODY_LIMIT).collect::<String>();
            tracing::error!(
                status = %status,
                body = %message,
                "Cart backend returned non-success status"
            );
            return Err(CartError::Mutation {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(ERROR_BODY_LIMIT).collect::<String>(),
                "Failed to parse cart backend response"
            );
            CartError::Decode(e.to_string())
        })
    }
}

impl CartBackend for RestCartClient {
    #[instrument(skip(self))]
    async fn session_user(&self) -> Result<Option<SessionUser>> {
        let request = self.request(Method::GET, "session-user")?;
        match self.send(request).await {
            Ok(response) => Self::decode(response).await.map(Some),
            Err(CartError::LoginRequired) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<RemoteCart> {
        let request = self.request(Method::GET, "cart")?;
        let response = self.send(request).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self), fields(product_id = %request.product_id, quantity = request.quantity))]
    async fn add(&self, request: &AddLineRequest) -> Result<()> {
        let builder = self.request(Method::POST, "cart")?.json(request);
        self.send(builder).await.map(drop)
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn update(&self, line_id: &LineId, quantity: u32) -> Result<()> {
        let builder = self
            .request(Method::PUT, &Self::line_path(line_id))?
            .json(&UpdateLineRequest { quantity });
        self.send(builder).await.map(drop)
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn remove(&self, line_id: &LineId) -> Result<()> {
        let builder = self.request(Method::DELETE, &Self::line_path(line_id))?;
        self.send(builder).await.map(drop)
    }

    #[instrument(skip(self, line_ids), fields(count = line_ids.len()))]
    async fn bulk_remove(&self, line_ids: &[LineId]) -> Result<()> {
        let builder = self
            .request(Method::POST, "cart/bulk-delete")?
            .json(&BulkDeleteRequest {
                line_ids: line_ids.to_vec(),
            });
        self.send(builder).await.map(drop)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let builder = self.request(Method::POST, "cart/clear")?;
        self.send(builder).await.map(drop)
    }

    #[instrument(skip(self))]
    async fn validate(&self) -> Result<Vec<InvalidItemRef>> {
        let request = self.request(Method::GET, "cart/validate")?;
        let response = self.send(request).await?;
        Self::decode::<ValidateResponse>(response)
            .await
            .map(ValidateResponse::into_items)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn product(&self, product_id: &ProductId) -> Result<ProductSnapshot> {
        if let Some(snapshot) = self.inner.catalog.get(product_id).await {
            debug!("Cache hit for product");
            return Ok(snapshot);
        }

        let path = format!("products/{}", urlencoding::encode(product_id.as_str()));
        let request = self.request(Method::GET, &path)?;
        let response = self.send(request).await?;
        let snapshot = ProductSnapshot::from(Self::decode::<CatalogProduct>(response).await?);

        self.inner
            .catalog
            .insert(product_id.clone(), snapshot.clone())
            .await;

        Ok(snapshot)
    }
}
