// src/api/mod.rs

pub mod invalidation;
pub mod odata;

use reqwest::{Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::{config::Config, error::AppError, session::SessionContext};

pub use invalidation::{Collection, InvalidationBus, Subscription};
pub use odata::{Literal, ODataPage, ODataQuery, SortDirection};

/// Authenticated client for the backend's REST (`/api`) and OData surfaces.
///
/// Attaches the session's bearer token when there is one. A 401 destroys the
/// session before the error is returned, so callers only have to redirect.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    odata_prefix: String,
    session: SessionContext,
    bus: InvalidationBus,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        session: SessionContext,
        bus: InvalidationBus,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| AppError::InternalError(format!("HTTP client: {}", e)))?;

        let prefix = config.odata_prefix.trim_matches('/');

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            odata_prefix: format!("/{}", prefix),
            session,
            bus,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn invalidation(&self) -> &InvalidationBus {
        &self.bus
    }

    /// `{base}/api/{path}` with optional query pairs.
    pub fn api_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, AppError> {
        let mut url = Url::parse(&format!(
            "{}/api/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// `{base}{odata prefix}/{entity}?{query}`.
    pub fn odata_url(&self, entity: &str, query: &ODataQuery) -> Result<Url, AppError> {
        let mut url = Url::parse(&format!(
            "{}{}/{}",
            self.base_url, self.odata_prefix, entity
        ))?;
        let qs = query.to_query_string()?;
        if !qs.is_empty() {
            url.set_query(Some(&qs));
        }
        Ok(url)
    }

    /// Fetches one page of an OData collection.
    pub async fn get_collection<T: DeserializeOwned>(
        &self,
        entity: &str,
        query: &ODataQuery,
    ) -> Result<ODataPage<T>, AppError> {
        let url = self.odata_url(entity, query)?;
        let body = self.send(Method::GET, url, None::<&()>).await?;
        parse_body(&body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let body = self.send(Method::GET, url, None::<&()>).await?;
        parse_body(&body)
    }

    /// POST returning a parsed body. `invalidates` is published on success.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
        invalidates: Option<Collection>,
    ) -> Result<T, AppError> {
        let text = self.send(Method::POST, url, Some(body)).await?;
        if let Some(collection) = invalidates {
            self.bus.publish(collection);
        }
        parse_body(&text)
    }

    /// POST whose response body is not needed.
    pub async fn post(
        &self,
        url: Url,
        body: &impl Serialize,
        invalidates: Collection,
    ) -> Result<(), AppError> {
        self.send(Method::POST, url, Some(body)).await?;
        self.bus.publish(invalidates);
        Ok(())
    }

    /// PUT whose response body is not needed.
    pub async fn put(
        &self,
        url: Url,
        body: &impl Serialize,
        invalidates: Collection,
    ) -> Result<(), AppError> {
        self.send(Method::PUT, url, Some(body)).await?;
        self.bus.publish(invalidates);
        Ok(())
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
        invalidates: Collection,
    ) -> Result<T, AppError> {
        let text = self.send(Method::PUT, url, Some(body)).await?;
        self.bus.publish(invalidates);
        parse_body(&text)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<String, AppError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Request {} {} failed: {:?}", method, url.path(), e);
            AppError::from(e)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            tracing::error!("Failed to read response of {} {}: {:?}", method, url.path(), e);
            AppError::from(e)
        })?;

        if status.is_success() {
            return Ok(text);
        }

        if status == StatusCode::UNAUTHORIZED && self.session.is_authenticated() {
            tracing::warn!("Session rejected by backend, signing out");
            if let Err(e) = self.session.destroy().await {
                tracing::error!("Failed to clear session: {:?}", e);
            }
        }

        let err = AppError::from_status(status, &text);
        tracing::warn!("{} {} -> {}: {}", method, url.path(), status, err);
        Err(err)
    }
}

fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, AppError> {
    serde_json::from_str(text).map_err(|e| {
        tracing::error!("Failed to decode response body: {:?}", e);
        AppError::from(e)
    })
}
