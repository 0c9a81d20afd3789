//! Route handlers for the public read API and the admin write API.

use axum::Json;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::application::auth::AdminStatus;
use crate::domain::site_config::SiteConfigPatch;
use crate::domain::works::WorkItemInput;

use super::error::{ApiError, receipt_response, upload_response};
use super::state::HttpState;

/// Header carrying the caller's own store token.
pub const PROVIDER_TOKEN_HEADER: &str = "x-github-token";

/// Session credential and optional store token taken from request headers.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub session: String,
    pub provider_token: Option<String>,
}

impl Credentials {
    pub fn provider_token(&self) -> Option<&str> {
        self.provider_token.as_deref()
    }
}

impl<S> FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = header_value(&parts.headers, AUTHORIZATION.as_str())
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim().to_string())
            .unwrap_or_default();
        let provider_token = header_value(&parts.headers, PROVIDER_TOKEN_HEADER).map(str::to_string);

        Ok(Self {
            session,
            provider_token,
        })
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WorksPayload {
    pub items: Vec<WorkItemInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub filename: String,
    pub content_base64: String,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn get_config(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.content.config().await)
}

pub async fn get_works(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.content.works().await)
}

pub async fn list_scraps(
    State(state): State<HttpState>,
    Query(query): Query<ScrapQuery>,
) -> impl IntoResponse {
    let query = query.q.unwrap_or_default();
    Json(state.content.search_scraps(&query).await)
}

pub async fn get_scrap(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    state
        .content
        .scrap(&slug)
        .await
        .map(|scrap| Json(scrap).into_response())
        .ok_or_else(|| ApiError::not_found("Scrap not found"))
}

pub async fn get_page(
    State(state): State<HttpState>,
    Path(page): Path<String>,
) -> Result<Response, ApiError> {
    let response = match page.as_str() {
        "home" => Json(state.content.home_page().await).into_response(),
        "tech" => Json(state.content.tech_page().await).into_response(),
        "author" => Json(state.content.author_page().await).into_response(),
        _ => return Err(ApiError::not_found("Page not found")),
    };
    Ok(response)
}

pub async fn verify_admin(
    State(state): State<HttpState>,
    credentials: Credentials,
) -> Json<AdminStatus> {
    Json(state.gate.check_admin(&credentials.session).await)
}

pub async fn update_config(
    State(state): State<HttpState>,
    credentials: Credentials,
    Json(patch): Json<SiteConfigPatch>,
) -> Response {
    let result = state
        .settings
        .update(&credentials.session, credentials.provider_token(), patch)
        .await;
    receipt_response("infra::http::update_config", result)
}

pub async fn replace_works(
    State(state): State<HttpState>,
    credentials: Credentials,
    Json(payload): Json<WorksPayload>,
) -> Response {
    let result = state
        .works
        .replace(&credentials.session, credentials.provider_token(), payload.items)
        .await;
    receipt_response("infra::http::replace_works", result)
}

pub async fn upload_author_icon(
    State(state): State<HttpState>,
    credentials: Credentials,
    Json(payload): Json<ImagePayload>,
) -> Response {
    let result = state
        .uploads
        .upload_author_icon(
            &credentials.session,
            credentials.provider_token(),
            &payload.filename,
            &payload.content_base64,
        )
        .await;
    upload_response("infra::http::upload_author_icon", result)
}

pub async fn upload_work_thumbnail(
    State(state): State<HttpState>,
    Path(work_id): Path<String>,
    credentials: Credentials,
    Json(payload): Json<ImagePayload>,
) -> Response {
    let result = state
        .works
        .upload_thumbnail(
            &credentials.session,
            credentials.provider_token(),
            &work_id,
            &payload.filename,
            &payload.content_base64,
        )
        .await;
    upload_response("infra::http::upload_work_thumbnail", result)
}
