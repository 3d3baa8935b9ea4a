use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Error body returned by PostgREST, kept typed so callers can `downcast_ref` it
/// and react to specific Postgres codes (e.g. `23P01` exclusion violations).
#[derive(Error, Debug, Clone)]
#[error("PostgREST error ({status}): {message}")]
pub struct PostgrestError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub details: Option<String>,
}

impl PostgrestError {
    pub fn is_exclusion_violation(&self) -> bool {
        self.code.as_deref() == Some("23P01")
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some("23505")
    }

    /// Constraint names appear in either `message` or `details` depending on the server version.
    pub fn mentions(&self, needle: &str) -> bool {
        self.message.contains(needle)
            || self.details.as_deref().map(|d| d.contains(needle)).unwrap_or(false)
    }
}

#[derive(Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>, extra: &[(&str, &str)]) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Server-side calls without a user token run with the service key.
        let bearer = auth_token.unwrap_or(&self.service_key);
        if !bearer.is_empty() {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", bearer))?);
        }

        for (name, value) in extra {
            headers.insert(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
        }

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, &[]).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let headers = self.get_headers(auth_token, extra_headers)?;

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            let parsed: Option<PostgrestErrorBody> = serde_json::from_str(&error_text).ok();
            let (code, message, details) = match parsed {
                Some(body) => (body.code, body.message.unwrap_or_else(|| error_text.clone()), body.details),
                None => (None, error_text, None),
            };

            return Err(anyhow!(PostgrestError {
                status: status.as_u16(),
                code,
                message,
                details,
            }));
        }

        // PATCH/DELETE without `return=representation` reply with an empty body.
        let bytes = response.bytes().await?;
        let raw: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        Ok(serde_json::from_slice(raw)?)
    }

    /// Inserts a row and returns the stored representation.
    pub async fn insert<T: DeserializeOwned>(&self, table: &str, row: Value) -> Result<T> {
        let rows: Vec<T> = self
            .request_with_headers(
                Method::POST,
                &format!("/rest/v1/{}", table),
                None,
                Some(row),
                &[("Prefer", "return=representation")],
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("insert into {} returned no rows", table))
    }

    /// Inserts or merges on `on_conflict`, returning the stored representation.
    pub async fn upsert<T: DeserializeOwned>(&self, table: &str, on_conflict: &str, row: Value) -> Result<T> {
        let rows: Vec<T> = self
            .request_with_headers(
                Method::POST,
                &format!("/rest/v1/{}?on_conflict={}", table, on_conflict),
                None,
                Some(row),
                &[("Prefer", "return=representation,resolution=merge-duplicates")],
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("upsert into {} returned no rows", table))
    }

    /// PATCHes every row matching `filter` and returns the updated rows.
    /// An empty result means no row matched (e.g. a stale version filter).
    pub async fn update<T: DeserializeOwned>(&self, table: &str, filter: &str, patch: Value) -> Result<Vec<T>> {
        self.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/{}?{}", table, filter),
            None,
            Some(patch),
            &[("Prefer", "return=representation")],
        )
        .await
    }

    pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>> {
        self.request(Method::GET, &format!("/rest/v1/{}?{}", table, query), None, None)
            .await
    }

    pub async fn select_one<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Option<T>> {
        let rows: Vec<T> = self.select(table, &format!("{}&limit=1", query)).await?;
        Ok(rows.into_iter().next())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_exclusion_violation_and_constraint_name() {
        let err = PostgrestError {
            status: 409,
            code: Some("23P01".to_string()),
            message: "conflicting key value violates exclusion constraint \"no_expert_overlap\"".to_string(),
            details: None,
        };
        assert!(err.is_exclusion_violation());
        assert!(err.mentions("no_expert_overlap"));
        assert!(!err.mentions("no_client_overlap"));
    }
}
