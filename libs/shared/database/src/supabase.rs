use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::StoreError;

pub type Query = Vec<(String, String)>;

/// Thin PostgREST client authenticated with the service key.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let key = HeaderValue::from_str(&self.service_key)
            .map_err(|e| StoreError::Backend(format!("Invalid service key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.service_key))
            .map_err(|e| StoreError::Backend(format!("Invalid service key: {}", e)))?;

        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<Value>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let (data, _) = self
            .request_with_headers(method, path, query, body, HeaderMap::new())
            .await?;
        Ok(data)
    }

    /// Sends a request with extra headers (e.g. `Prefer`) and returns the
    /// decoded body along with the response headers.
    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<Value>,
        extra_headers: HeaderMap,
    ) -> Result<(T, HeaderMap), StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        headers.extend(extra_headers);

        let mut req = self.client.request(method, &url).headers(headers).query(query);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                404 => StoreError::NotFound(error_text),
                409 => StoreError::UniqueViolation(error_text),
                412 => StoreError::StaleWrite(error_text),
                _ => StoreError::Backend(format!("API error ({}): {}", status, error_text)),
            });
        }

        let response_headers = response.headers().clone();
        let data = response.json::<T>().await?;
        Ok((data, response_headers))
    }

    /// Exact row count for a filtered table read, taken from `Content-Range`.
    pub async fn count(&self, path: &str, query: &Query) -> Result<u64, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let mut query = query.clone();
        query.push(("select".to_string(), "id".to_string()));
        query.push(("limit".to_string(), "1".to_string()));

        let (_, response_headers): (Vec<Value>, HeaderMap) = self
            .request_with_headers(Method::GET, path, &query, None, headers)
            .await?;

        response_headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| StoreError::Backend("Missing Content-Range total".to_string()))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

/// `0-9/42` and `*/0` both carry the total after the slash.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
}
