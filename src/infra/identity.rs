//! [`IdentityProvider`] backed by a Supabase auth endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::application::auth::{Identity, IdentityError, IdentityProvider};
use crate::config::IdentitySettings;

use super::error::InfraError;
use super::github::user_agent;

const API_KEY_HEADER: &str = "apikey";
/// Metadata attributes that may carry the account handle, in priority order.
const HANDLE_ATTRIBUTES: [&str; 3] = ["user_name", "user_login", "login"];

#[derive(Debug, Clone)]
pub struct SupabaseIdentity {
    client: Client,
    user_url: Url,
    api_key: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(base: &Url, api_key: Option<String>, settings: &IdentitySettings) -> Result<Self, InfraError> {
        let mut user_url = base.clone();
        user_url
            .path_segments_mut()
            .map_err(|()| InfraError::configuration("identity URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["auth", "v1", "user"]);

        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            user_url,
            api_key,
        })
    }

    /// `None` when no identity URL is configured.
    pub fn from_settings(settings: &IdentitySettings) -> Result<Option<Self>, InfraError> {
        settings
            .url
            .as_ref()
            .map(|url| Self::new(url, settings.api_key.clone(), settings))
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    user_metadata: HashMap<String, Value>,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        let account_handle = HANDLE_ATTRIBUTES.iter().find_map(|attribute| {
            user.user_metadata
                .get(*attribute)
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Identity {
            user_id: user.id,
            account_handle,
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    #[instrument(skip_all)]
    async fn user_for_credential(&self, credential: &str) -> Result<Identity, IdentityError> {
        let mut request = self
            .client
            .get(self.user_url.clone())
            .header(AUTHORIZATION, format!("Bearer {credential}"));
        if let Some(key) = self.api_key.as_deref() {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                IdentityError::Transport("identity request timed out".to_string())
            } else {
                IdentityError::Transport(err.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => {
                let user: UserResponse = response
                    .json()
                    .await
                    .map_err(|err| IdentityError::Malformed(err.to_string()))?;
                Ok(user.into())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(IdentityError::InvalidSession)
            }
            status => Err(IdentityError::Transport(format!(
                "identity provider responded with {status}"
            ))),
        }
    }
}
