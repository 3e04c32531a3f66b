// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Security
//!
//! - Keys are cached for 5 minutes, then refetched
//! - A failed fetch is reported to the caller; no stale keys are served
//!
//! ## Usage
//!
//! Built from `CLERK_JWKS_URL` at startup and owned by the identity-provider
//! verification strategy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use super::error::AuthError;

/// Default JWKS cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

#[derive(Clone)]
enum KeySource {
    Remote { url: String, client: reqwest::Client },
    Static(Arc<JwkSet>),
}

/// JWKS manager with caching.
#[derive(Clone)]
pub struct JwksManager {
    source: KeySource,
    cache_ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
}

impl JwksManager {
    /// Create a manager that fetches keys from `jwks_url`.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::InternalError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            source: KeySource::Remote {
                url: jwks_url.into(),
                client,
            },
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Create a manager over a fixed key set (no network access).
    pub fn from_static(jwks: JwkSet) -> Self {
        Self {
            source: KeySource::Static(Arc::new(jwks)),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Fetch JWKS (with caching).
    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        let (url, client) = match &self.source {
            KeySource::Static(jwks) => return Ok(jwks.as_ref().clone()),
            KeySource::Remote { url, client } => (url, client),
        };

        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        let jwks = fetch_jwks(client, url).await?;

        {
            let mut cache = self.cache.write().await;
            *cache = Some(CacheEntry {
                jwks: jwks.clone(),
                fetched_at: Instant::now(),
            });
        }

        tracing::debug!(keys = jwks.keys.len(), "JWKS refreshed");
        Ok(jwks)
    }

    /// Get a decoding key for the given key ID.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;

        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .ok_or(AuthError::NoMatchingKey)?;

        jwk_to_decoding_key(jwk)
    }

    /// Get any usable decoding key (for tokens without kid).
    pub async fn get_any_decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;

        jwks.keys
            .iter()
            .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
            .ok_or(AuthError::NoMatchingKey)
    }

    /// Whether the key set can currently be obtained.
    pub async fn is_available(&self) -> bool {
        self.get_jwks().await.is_ok()
    }
}

async fn fetch_jwks(client: &reqwest::Client, url: &str) -> Result<JwkSet, AuthError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

    if !response.status().is_success() {
        return Err(AuthError::JwksFetchError(format!(
            "HTTP {} from JWKS endpoint",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::JwksFetchError(e.to_string()))
}

/// Convert a JWK to a DecodingKey and the algorithm it verifies.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    let default_alg = match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Algorithm::RS256,
        AlgorithmParameters::EllipticCurve(_) => Algorithm::ES256,
        AlgorithmParameters::OctetKey(_) => Algorithm::HS256,
        AlgorithmParameters::OctetKeyPair(_) => Algorithm::EdDSA,
    };

    let alg = match jwk.common.key_algorithm {
        Some(KeyAlgorithm::RS256) => Algorithm::RS256,
        Some(KeyAlgorithm::RS384) => Algorithm::RS384,
        Some(KeyAlgorithm::RS512) => Algorithm::RS512,
        Some(KeyAlgorithm::PS256) => Algorithm::PS256,
        Some(KeyAlgorithm::PS384) => Algorithm::PS384,
        Some(KeyAlgorithm::PS512) => Algorithm::PS512,
        Some(KeyAlgorithm::ES256) => Algorithm::ES256,
        Some(KeyAlgorithm::ES384) => Algorithm::ES384,
        Some(KeyAlgorithm::HS256) => Algorithm::HS256,
        Some(KeyAlgorithm::HS384) => Algorithm::HS384,
        Some(KeyAlgorithm::HS512) => Algorithm::HS512,
        Some(KeyAlgorithm::EdDSA) => Algorithm::EdDSA,
        _ => default_alg,
    };

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthError::InternalError(format!("Unusable key in JWKS: {e}")))?;
    Ok((key, alg))
}
