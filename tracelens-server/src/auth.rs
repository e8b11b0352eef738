// Copyright 2025 TraceLens Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Identity resolution contract
//!
//! Authentication itself is an external concern; the server only needs a
//! resolved identity per request. Anonymous requests get the shared bounded
//! buffer, identified ones get their own storage scope.

use axum::http::HeaderMap;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::AuthConfig;
use tracelens_store::ScopeKey;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const PROJECT_HEADER: &str = "x-project-id";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown api key")]
    UnknownKey,
}

/// Resolved request identity. Both fields absent means anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Storage scope for this identity; `None` for anonymous requests.
    pub fn scope(&self) -> Option<ScopeKey> {
        let user_id = self.user_id.as_ref()?;
        let mut key = ScopeKey::new(user_id.clone());
        if let Some(project) = &self.project_id {
            key = key.with_project(project.clone());
        }
        Some(key)
    }
}

/// Maps request headers to an identity. Swappable so deployments can plug in
/// their own auth backend.
pub trait AuthResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError>;
}

/// Static API-key resolver backed by the `[auth]` config section.
///
/// Disabled auth resolves every request as anonymous. Enabled auth maps a
/// present `x-api-key` through the key table and rejects unknown keys;
/// requests without the header stay anonymous.
pub struct StaticKeyResolver {
    enabled: bool,
    keys: HashMap<String, String>,
}

impl StaticKeyResolver {
    pub fn from_config(config: &AuthConfig) -> Self {
        let keys = config
            .api_keys
            .iter()
            .filter_map(|entry| {
                entry
                    .split_once(':')
                    .map(|(key, user)| (key.to_string(), user.to_string()))
            })
            .collect();
        Self {
            enabled: config.enabled,
            keys,
        }
    }
}

impl AuthResolver for StaticKeyResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        if !self.enabled {
            return Ok(AuthContext::anonymous());
        }

        let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
            return Ok(AuthContext::anonymous());
        };
        let user_id = self.keys.get(key).ok_or(AuthError::UnknownKey)?.clone();

        let project_id = headers
            .get(PROJECT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(AuthContext {
            user_id: Some(user_id),
            project_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(enabled: bool) -> StaticKeyResolver {
        StaticKeyResolver::from_config(&AuthConfig {
            enabled,
            api_keys: vec!["secret:alice".to_string()],
        })
    }

    #[test]
    fn test_disabled_auth_is_always_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "secret".parse().unwrap());

        let ctx = resolver(false).resolve(&headers).unwrap();
        assert_eq!(ctx, AuthContext::anonymous());
        assert!(ctx.scope().is_none());
    }

    #[test]
    fn test_known_key_resolves_user_scope() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "secret".parse().unwrap());
        headers.insert(PROJECT_HEADER, "checkout".parse().unwrap());

        let ctx = resolver(true).resolve(&headers).unwrap();
        assert_eq!(ctx.user_id.as_deref(), Some("alice"));
        assert_eq!(
            ctx.scope(),
            Some(ScopeKey::new("alice").with_project("checkout"))
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "wrong".parse().unwrap());
        assert!(resolver(true).resolve(&headers).is_err());
    }

    #[test]
    fn test_missing_key_stays_anonymous() {
        let ctx = resolver(true).resolve(&HeaderMap::new()).unwrap();
        assert!(ctx.scope().is_none());
    }
}
