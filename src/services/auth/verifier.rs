/*
 * Responsibility
 * - IdP の well-known endpoint から jwks_uri を discovery し、署名鍵を取得・キャッシュ
 * - access token の署名 / exp / iss 検証 → 生の claims (serde_json::Value) を返す
 * - 鍵取得の失敗は検証エラーとして伝搬（silent ALLOW は絶対にしない）
 */
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("jwt verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("token algorithm {0:?} is not allowed")]
    UnsupportedAlgorithm(Algorithm),

    #[error("token header has no 'kid'")]
    MissingKeyId,

    #[error("no signing key matching kid '{0}'")]
    UnknownKeyId(String),

    #[error("signing key fetch failed: {0}")]
    KeyFetch(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

/// One entry of the IdP's published key set. Only RSA keys are used;
/// anything else is skipped when building the cache.
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// Verifies access tokens against the issuer's published signing keys.
///
/// Keys are fetched lazily (first verification) and re-fetched when the cache
/// is older than `refresh_interval` or an unknown `kid` shows up, which covers
/// key rotation.
///
/// Audience is deliberately not validated here: issuer and timestamps are the
/// authentication boundary, and the client id only selects which client roles
/// count (see `authorities`).
pub struct TokenVerifier {
    issuer: String,
    leeway_seconds: u64,
    refresh_interval: Duration,
    http: reqwest::Client,
    jwks_uri: RwLock<Option<String>>,
    keys: RwLock<Option<CachedKeys>>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // DecodingKey は Debug 不可。issuer だけで十分。
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.issuer)
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(
        issuer: impl Into<String>,
        leeway_seconds: u64,
        refresh_interval: Duration,
    ) -> Result<Self, VerifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            issuer: issuer.into(),
            leeway_seconds,
            refresh_interval,
            http,
            jwks_uri: RwLock::new(None),
            keys: RwLock::new(None),
        })
    }

    /// Verify a bearer token and return its raw claims.
    ///
    /// Checks, in order: header shape, algorithm allowlist, key lookup by
    /// `kid`, then signature / `exp` / `iss` via `jsonwebtoken`.
    pub async fn verify(&self, token: &str) -> Result<Value, VerifyError> {
        let header = decode_header(token)?;

        // Allow only the RSA family Keycloak signs with. Rejecting everything
        // else up front closes the algorithm-confusion hole (e.g. an HS256
        // token "signed" with the public key as HMAC secret).
        if !matches!(
            header.alg,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
        ) {
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }

        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = self.leeway_seconds;
        validation.validate_aud = false;

        let data = decode::<Value>(token, &key, &validation)?;
        Ok(data.claims)
    }

    /// Look up a decoding key, refreshing the cached key set if it is stale
    /// or does not know this `kid`.
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.fetched_at.elapsed() < self.refresh_interval
                && let Some(key) = cached.keys.get(kid)
            {
                return Ok(key.clone());
            }
        }

        self.refresh_keys().await?;

        let cache = self.keys.read().await;
        cache
            .as_ref()
            .and_then(|c| c.keys.get(kid).cloned())
            .ok_or_else(|| {
                tracing::warn!(kid, "kid not present in refreshed key set");
                VerifyError::UnknownKeyId(kid.to_owned())
            })
    }

    /// Resolve `jwks_uri` from the issuer's discovery document (cached after
    /// the first successful lookup).
    async fn jwks_uri(&self) -> Result<String, VerifyError> {
        if let Some(uri) = self.jwks_uri.read().await.as_ref() {
            return Ok(uri.clone());
        }

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            self.issuer.trim_end_matches('/')
        );
        tracing::debug!(url = %discovery_url, "fetching OIDC discovery document");

        let doc: DiscoveryDocument = self
            .http
            .get(&discovery_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut slot = self.jwks_uri.write().await;
        *slot = Some(doc.jwks_uri.clone());
        Ok(doc.jwks_uri)
    }

    async fn refresh_keys(&self) -> Result<(), VerifyError> {
        let jwks_uri = self.jwks_uri().await?;

        let jwks: JwksResponse = self
            .http
            .get(&jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n.as_deref(), jwk.e.as_deref())
            else {
                continue;
            };
            if jwk.kty != "RSA" {
                continue;
            }
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(err) => {
                    tracing::warn!(kid = %kid, error = %err, "skipping malformed JWK");
                }
            }
        }

        tracing::info!(key_count = keys.len(), "signing key set refreshed");

        let mut cache = self.keys.write().await;
        *cache = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn verifier() -> TokenVerifier {
        // Lazy key fetch: constructing a verifier never touches the network.
        TokenVerifier::new(
            "https://idp.invalid/realms/portal",
            60,
            Duration::from_secs(300),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn garbage_token_is_rejected_before_any_key_fetch() {
        let result = verifier().verify("not-a-jwt").await;
        assert!(matches!(result, Err(VerifyError::Jwt(_))));
    }

    #[tokio::test]
    async fn hmac_signed_token_is_rejected_by_the_algorithm_allowlist() {
        let claims = json!({"sub": "user", "exp": 4102444800u64});
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();

        let result = verifier().verify(&token).await;
        assert!(matches!(
            result,
            Err(VerifyError::UnsupportedAlgorithm(Algorithm::HS256))
        ));
    }
}
