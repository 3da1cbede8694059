// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hosted Postgres REST client with typed operations.
//!
//! Provides the profile operations the session guard needs on the `users`
//! table. Requests carry the project's anon key, plus the signed-in user's
//! access token when scoped with [`SupabaseDb::with_access_token`] so that
//! row-level security evaluates as that user.

use super::{tables, ProfileStore};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{NewProfile, Profile};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_RANGE};
use reqwest::{Method, RequestBuilder, StatusCode};

/// REST database client.
#[derive(Clone)]
pub struct SupabaseDb {
    http: reqwest::Client,
    rest_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseDb {
    /// Create a client for the project in `config`.
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            rest_url: format!("{}/rest/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
            access_token: None,
        }
    }

    /// A copy of this client that authenticates as the given user.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..self.clone()
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);

        self.http
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Map non-2xx responses to errors.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT => Err(AppError::Conflict(body)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!(%status, body = %body, "Table access denied");
                Err(AppError::Unauthorized)
            }
            _ => Err(AppError::Database(format!("HTTP {}: {}", status, body))),
        }
    }
}

/// Parse the total from a `Content-Range` header (`0-9/42` or `*/42`).
fn parse_content_range_total(value: &HeaderValue) -> Option<u64> {
    value
        .to_str()
        .ok()?
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
}

#[async_trait]
impl ProfileStore for SupabaseDb {
    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        let response = self
            .request(Method::GET, tables::USERS)
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())])
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let rows: Vec<Profile> = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Database(format!("JSON parse error: {}", e)))?;

        Ok(rows.into_iter().next())
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .request(Method::HEAD, tables::USERS)
            .query(&[("select", "*")])
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let response = Self::check_response(response).await?;

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(parse_content_range_total)
            .ok_or_else(|| AppError::Database("missing or malformed Content-Range".to_string()))
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile> {
        let response = self
            .request(Method::POST, tables::USERS)
            .header("Prefer", "return=representation")
            .json(&profile)
            .send()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let rows: Vec<Profile> = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Database(format!("JSON parse error: {}", e)))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Database("insert returned no row".to_string()))?;

        tracing::debug!(id = %row.id, role = %row.role, "Inserted profile");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        let parse = |s: &'static str| parse_content_range_total(&HeaderValue::from_static(s));

        assert_eq!(parse("*/0"), Some(0));
        assert_eq!(parse("0-9/42"), Some(42));
        assert_eq!(parse("0-9/*"), None);
        assert_eq!(parse("garbage"), None);
    }
}
