// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! A token is offered to each configured strategy in a fixed order: the
//! identity provider (Clerk JWKS) first, the locally-issued HS256 secret
//! second. The first strategy that verifies it wins. When all fail, the
//! individual outcomes are folded into one error: expired beats invalid,
//! invalid beats a generic failure.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use utoipa::ToSchema;

use super::claims::{AuthenticatedUser, LocalClaims, ProviderClaims, TokenSource, VerifiedIdentity};
use super::directory::normalize_email;
use super::error::AuthError;
use super::jwks::JwksManager;
use crate::config::{LocalTokenConfig, ProviderConfig};

/// Clock skew tolerance for `exp`/`nbf`.
const LEEWAY_SECS: u64 = 60;

/// Why a single strategy did not verify a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Signature checked out but the token is past its expiry
    Expired,
    /// The strategy recognized the token but rejected it
    Invalid,
    /// The token is not one this strategy handles
    Unrecognized,
    /// The strategy could not run (e.g. JWKS unreachable)
    Unavailable,
}

/// Structured result of one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(VerifiedIdentity),
    Failed(FailureKind),
}

/// Identity-provider verification settings plus the key source.
pub struct ProviderStrategy {
    jwks: JwksManager,
    issuer: Option<String>,
    audience: Option<String>,
}

impl ProviderStrategy {
    pub fn new(jwks: JwksManager, issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            jwks,
            issuer,
            audience,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, AuthError> {
        Ok(Self::new(
            JwksManager::new(config.jwks_url.clone())?,
            config.issuer.clone(),
            config.audience.clone(),
        ))
    }

    async fn verify(&self, token: &str) -> VerificationOutcome {
        let Ok(header) = decode_header(token) else {
            return VerificationOutcome::Failed(FailureKind::Unrecognized);
        };

        let key = match header.kid.as_deref() {
            Some(kid) => self.jwks.get_decoding_key(kid).await,
            None => self.jwks.get_any_decoding_key().await,
        };
        let (decoding_key, algorithm) = match key {
            Ok(key) => key,
            Err(AuthError::NoMatchingKey) => {
                return VerificationOutcome::Failed(FailureKind::Unrecognized)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity provider keys unavailable");
                return VerificationOutcome::Failed(FailureKind::Unavailable);
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = LEEWAY_SECS;
        match &self.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let claims = match decode::<ProviderClaims>(token, &decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => return VerificationOutcome::Failed(classify_jwt_error(e.kind())),
        };

        let Some(email) = claims.email.as_deref().map(normalize_email).filter(|e| !e.is_empty()) else {
            tracing::debug!(sub = %claims.sub, "Provider token carries no email claim");
            return VerificationOutcome::Failed(FailureKind::Invalid);
        };

        VerificationOutcome::Verified(VerifiedIdentity {
            email,
            name: claims.name,
            provider_subject: Some(claims.sub),
            session_id: claims.sid,
            source: TokenSource::IdentityProvider,
            expires_at: claims.exp,
        })
    }
}

/// Shared-secret verification of locally-issued tokens.
pub struct LocalStrategy {
    key: DecodingKey,
    issuer: String,
}

impl LocalStrategy {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    fn verify(&self, token: &str) -> VerificationOutcome {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        match decode::<LocalClaims>(token, &self.key, &validation) {
            Ok(data) => VerificationOutcome::Verified(VerifiedIdentity {
                email: normalize_email(&data.claims.email),
                name: data.claims.name,
                provider_subject: None,
                session_id: None,
                source: TokenSource::Local,
                expires_at: data.claims.exp,
            }),
            Err(e) => VerificationOutcome::Failed(classify_jwt_error(e.kind())),
        }
    }
}

/// One way of verifying a bearer token.
pub enum VerificationStrategy {
    IdentityProvider(ProviderStrategy),
    LocalSecret(LocalStrategy),
}

impl VerificationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            VerificationStrategy::IdentityProvider(_) => "identity_provider",
            VerificationStrategy::LocalSecret(_) => "local_secret",
        }
    }

    pub async fn verify(&self, token: &str) -> VerificationOutcome {
        match self {
            VerificationStrategy::IdentityProvider(strategy) => strategy.verify(token).await,
            VerificationStrategy::LocalSecret(strategy) => strategy.verify(token),
        }
    }
}

fn classify_jwt_error(kind: &ErrorKind) -> FailureKind {
    match kind {
        ErrorKind::ExpiredSignature => FailureKind::Expired,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => FailureKind::Unrecognized,
        _ => FailureKind::Invalid,
    }
}

/// Fold the failures of every strategy into the error reported to the caller.
pub fn classify_failures(failures: &[FailureKind]) -> AuthError {
    if failures.contains(&FailureKind::Expired) {
        AuthError::TokenExpired
    } else if failures.contains(&FailureKind::Invalid) {
        AuthError::InvalidToken
    } else {
        AuthError::AuthenticationFailed
    }
}

/// Verifies bearer tokens against the configured strategies, in order.
pub struct TokenVerifier {
    strategies: Vec<VerificationStrategy>,
    provider_jwks: Option<JwksManager>,
}

impl TokenVerifier {
    /// Build from strategies. Order is preserved.
    pub fn new(strategies: Vec<VerificationStrategy>) -> Self {
        let provider_jwks = strategies.iter().find_map(|s| match s {
            VerificationStrategy::IdentityProvider(p) => Some(p.jwks.clone()),
            VerificationStrategy::LocalSecret(_) => None,
        });
        Self {
            strategies,
            provider_jwks,
        }
    }

    /// Provider first when configured, local secret second when configured.
    pub fn from_config(
        provider: Option<&ProviderConfig>,
        local: Option<&LocalTokenConfig>,
    ) -> Result<Self, AuthError> {
        let mut strategies = Vec::new();
        if let Some(provider) = provider {
            strategies.push(VerificationStrategy::IdentityProvider(
                ProviderStrategy::from_config(provider)?,
            ));
        }
        if let Some(local) = local {
            strategies.push(VerificationStrategy::LocalSecret(LocalStrategy::new(
                local.secret.as_bytes(),
                local.issuer.clone(),
            )));
        }
        if strategies.is_empty() {
            tracing::warn!("No token verification strategy configured; every authenticated request will fail");
        }
        Ok(Self::new(strategies))
    }

    /// Identity-provider key set, when that strategy is configured.
    pub fn provider_jwks(&self) -> Option<&JwksManager> {
        self.provider_jwks.as_ref()
    }

    /// Verify a bearer token. Never succeeds without a strategy accepting it.
    pub async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        if decode_header(token).is_err() {
            return Err(AuthError::MalformedToken);
        }

        let mut failures = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.verify(token).await {
                VerificationOutcome::Verified(identity) => {
                    tracing::debug!(strategy = strategy.name(), email = %identity.email, "Token verified");
                    return Ok(identity);
                }
                VerificationOutcome::Failed(kind) => {
                    tracing::debug!(strategy = strategy.name(), failure = ?kind, "Token rejected by strategy");
                    failures.push(kind);
                }
            }
        }

        let error = classify_failures(&failures);
        tracing::warn!(error_code = error.error_code(), "Token verification failed");
        Err(error)
    }
}

/// A freshly issued local token.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    /// Expiry (Unix seconds)
    pub expires_at: i64,
}

/// Issues HS256 tokens accepted by [`LocalStrategy`].
pub struct LocalTokenIssuer {
    key: EncodingKey,
    issuer: String,
    ttl: Duration,
}

impl LocalTokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn from_config(config: &LocalTokenConfig) -> Self {
        Self::new(config.secret.as_bytes(), config.issuer.clone(), config.ttl)
    }

    /// Issue a token for an already-resolved user.
    pub fn issue(&self, user: &AuthenticatedUser) -> Result<IssuedToken, AuthError> {
        self.issue_until(user, None)
    }

    /// Issue a token that expires no later than `not_after` (Unix seconds).
    pub fn issue_until(
        &self,
        user: &AuthenticatedUser,
        not_after: Option<i64>,
    ) -> Result<IssuedToken, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let mut expires_at = now + self.ttl.as_secs() as i64;
        if let Some(not_after) = not_after {
            expires_at = expires_at.min(not_after);
        }
        if expires_at <= now {
            return Err(AuthError::TokenExpired);
        }
        let claims = LocalClaims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            name: Some(user.name.clone()),
            iss: self.issuer.clone(),
            iat: now,
            exp: expires_at,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| AuthError::InternalError(format!("Failed to sign token: {e}")))?;
        Ok(IssuedToken { token, expires_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use base64::Engine;
    use jsonwebtoken::jwk::JwkSet;

    const PROVIDER_SECRET: &[u8] = b"provider-test-secret";
    const LOCAL_SECRET: &[u8] = b"local-test-secret";
    const PROVIDER_KID: &str = "provider-key-1";

    fn provider_strategy() -> VerificationStrategy {
        let k = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(PROVIDER_SECRET);
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{ "kty": "oct", "kid": PROVIDER_KID, "alg": "HS256", "k": k }]
        }))
        .unwrap();
        VerificationStrategy::IdentityProvider(ProviderStrategy::new(
            JwksManager::from_static(jwks),
            Some("https://clerk.test".to_string()),
            None,
        ))
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(vec![
            provider_strategy(),
            VerificationStrategy::LocalSecret(LocalStrategy::new(LOCAL_SECRET, "realty-server")),
        ])
    }

    fn provider_token(claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(PROVIDER_KID.to_string());
        encode(&header, &claims, &EncodingKey::from_secret(PROVIDER_SECRET)).unwrap()
    }

    fn local_token(secret: &[u8], exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = LocalClaims {
            sub: "user-1".to_string(),
            email: "Local@Example.com".to_string(),
            name: None,
            iss: "realty-server".to_string(),
            iat: now,
            exp: now + exp_offset,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[tokio::test]
    async fn provider_token_verifies_first() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = provider_token(serde_json::json!({
            "sub": "user_2abc",
            "email": "Buyer@Example.com",
            "exp": exp,
            "iss": "https://clerk.test",
            "sid": "sess_1"
        }));

        let identity = verifier().verify(&token).await.unwrap();
        assert_eq!(identity.source, TokenSource::IdentityProvider);
        assert_eq!(identity.email, "buyer@example.com");
        assert_eq!(identity.provider_subject.as_deref(), Some("user_2abc"));
        assert_eq!(identity.session_id.as_deref(), Some("sess_1"));
    }

    #[tokio::test]
    async fn provider_token_without_email_is_invalid() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = provider_token(serde_json::json!({
            "sub": "user_2abc",
            "exp": exp,
            "iss": "https://clerk.test"
        }));

        let result = verifier().verify(&token).await;
        assert_eq!(result, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn provider_token_with_wrong_issuer_is_invalid() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = provider_token(serde_json::json!({
            "sub": "user_2abc",
            "email": "buyer@example.com",
            "exp": exp,
            "iss": "https://evil.test"
        }));

        assert_eq!(verifier().verify(&token).await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn local_token_verifies_second() {
        let identity = verifier().verify(&local_token(LOCAL_SECRET, 600)).await.unwrap();
        assert_eq!(identity.source, TokenSource::Local);
        assert_eq!(identity.email, "local@example.com");
        assert!(identity.provider_subject.is_none());
    }

    #[tokio::test]
    async fn expired_token_reports_expired() {
        let result = verifier().verify(&local_token(LOCAL_SECRET, -3600)).await;
        assert_eq!(result, Err(AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn expiry_within_leeway_is_accepted() {
        assert!(verifier().verify(&local_token(LOCAL_SECRET, -30)).await.is_ok());
    }

    #[tokio::test]
    async fn token_failing_both_strategies_is_rejected() {
        let result = verifier().verify(&local_token(b"some-other-secret", 600)).await;
        assert_eq!(result, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        assert_eq!(verifier().verify("not.a.jwt").await, Err(AuthError::MalformedToken));
        assert_eq!(verifier().verify("   ").await, Err(AuthError::MissingCredential));
    }

    #[tokio::test]
    async fn no_strategies_never_pass() {
        let empty = TokenVerifier::new(vec![]);
        let result = empty.verify(&local_token(LOCAL_SECRET, 600)).await;
        assert_eq!(result, Err(AuthError::AuthenticationFailed));
    }

    #[test]
    fn failures_fold_by_precedence() {
        use FailureKind::*;
        assert_eq!(classify_failures(&[Invalid, Expired]), AuthError::TokenExpired);
        assert_eq!(classify_failures(&[Unrecognized, Invalid]), AuthError::InvalidToken);
        assert_eq!(
            classify_failures(&[Unavailable, Unrecognized]),
            AuthError::AuthenticationFailed
        );
        assert_eq!(classify_failures(&[]), AuthError::AuthenticationFailed);
    }

    #[tokio::test]
    async fn issued_token_verifies_locally() {
        let issuer = LocalTokenIssuer::new(LOCAL_SECRET, "realty-server", Duration::from_secs(3600));
        let user = AuthenticatedUser {
            user_id: "user-9".to_string(),
            email: "seller@example.com".to_string(),
            name: "Seller".to_string(),
            role: Role::User,
            provider_subject: None,
            source: TokenSource::IdentityProvider,
            session_id: None,
        };

        let issued = issuer.issue(&user).unwrap();
        assert!(issued.expires_at > chrono::Utc::now().timestamp());

        let identity = verifier().verify(&issued.token).await.unwrap();
        assert_eq!(identity.source, TokenSource::Local);
        assert_eq!(identity.email, "seller@example.com");
        assert_eq!(identity.name.as_deref(), Some("Seller"));
    }

    #[test]
    fn issue_until_caps_expiry() {
        let issuer = LocalTokenIssuer::new(LOCAL_SECRET, "realty-server", Duration::from_secs(3600));
        let user = AuthenticatedUser {
            user_id: "user-9".to_string(),
            email: "seller@example.com".to_string(),
            name: "Seller".to_string(),
            role: Role::User,
            provider_subject: None,
            source: TokenSource::Local,
            session_id: None,
        };
        let now = chrono::Utc::now().timestamp();

        let capped = issuer.issue_until(&user, Some(now + 60)).unwrap();
        assert_eq!(capped.expires_at, now + 60);

        let uncapped = issuer.issue_until(&user, Some(now + 86_400)).unwrap();
        assert!(uncapped.expires_at <= now + 3601);

        assert_eq!(
            issuer.issue_until(&user, Some(now - 1)).unwrap_err(),
            AuthError::TokenExpired
        );
    }
}
