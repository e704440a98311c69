//! End-to-end pipeline tests: extraction, validation against a served
//! key set, transformation, caching, and the gatekeeper, using real
//! RSA-signed tokens and a mock key-set endpoint.

use std::sync::OnceLock;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tessera_auth::claims::TenantSource;
use tessera_auth::config::AuthConfig;
use tessera_auth::error::AuthError;
use tessera_auth::extract::BearerToken;
use tessera_auth::jwks::KeySetCacheConfig;
use tessera_auth::middleware::{AuthState, CurrentTenant, gatekeeper, resolve_context};
use tessera_auth::token::ValidationFailure;

const KID: &str = "test-key-1";
const ISSUER: &str = "https://id.example.com";
const AUDIENCE: &str = "tessera";

struct TestKeys {
    private_pem: String,
    jwks: Value,
    other_private_pem: String,
}

/// RSA key generation is slow; do it once per test binary.
fn test_keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let other_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();

        let public_key = RsaPublicKey::from(&private_key);
        let jwks = json!({
            "keys": [{
                "kty": "RSA",
                "kid": KID,
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            }]
        });

        TestKeys {
            private_pem: private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            jwks,
            other_private_pem: other_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
        }
    })
}

fn sign_token(private_pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

fn base_claims(exp_offset_secs: i64) -> Value {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    json!({
        "iss": ISSUER,
        "sub": "user-1",
        "aud": AUDIENCE,
        "exp": now + exp_offset_secs,
        "iat": now,
        "org_id": "acme",
        "roles": ["member", "purchasing"],
        "permissions": ["inventory:read", "orders:write"],
    })
}

async fn serve_jwks(expected_fetches: Option<u64>) -> MockServer {
    let server = MockServer::start().await;

    let mut mock = Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(test_keys().jwks.clone())
                .insert_header("Cache-Control", "max-age=3600"),
        );
    if let Some(count) = expected_fetches {
        mock = mock.expect(count);
    }
    mock.mount(&server).await;

    server
}

fn state_for(server: &MockServer, cache_ttl: Duration) -> AuthState {
    let mut config = AuthConfig::default();
    config.provider.issuer = ISSUER.to_string();
    config.provider.audience = AUDIENCE.to_string();
    config.provider.jwks_url = format!("{}/.well-known/jwks.json", server.uri());
    config.cache.ttl = cache_ttl;
    config.cookie.secure = false;

    let keys = KeySetCacheConfig::default().with_allow_http(true);
    AuthState::from_config(config, keys).unwrap()
}

#[tokio::test]
async fn valid_token_yields_tenant_context() {
    let server = serve_jwks(None).await;
    let state = state_for(&server, Duration::from_secs(300));

    let token = BearerToken::new(sign_token(&test_keys().private_pem, KID, &base_claims(3600)));

    let context = resolve_context(&state, &token).await.unwrap();
    assert_eq!(context.user_id, "user-1");
    assert_eq!(context.tenant_id, "acme");
    assert_eq!(context.tenant_source, TenantSource::Claim);
    assert_eq!(context.roles, vec!["member", "purchasing"]);
    assert!(context.has_permission("orders:write"));
}

#[tokio::test]
async fn resolution_is_deterministic() {
    let server = serve_jwks(None).await;
    let state = state_for(&server, Duration::from_secs(300));

    let token = BearerToken::new(sign_token(&test_keys().private_pem, KID, &base_claims(3600)));

    let first = resolve_context(&state, &token).await.unwrap();
    let second = resolve_context(&state, &token).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn cache_hit_skips_key_set_fetch() {
    // The endpoint tolerates exactly one fetch.
    let server = serve_jwks(Some(1)).await;
    let state = state_for(&server, Duration::from_secs(300));

    let token = BearerToken::new(sign_token(&test_keys().private_pem, KID, &base_claims(3600)));

    resolve_context(&state, &token).await.unwrap();
    // Second resolution hits the context cache; the mock's expectation
    // fails the test on a second fetch.
    resolve_context(&state, &token).await.unwrap();
    assert_eq!(state.cache.len().await, 1);
}

#[tokio::test]
async fn expired_token_is_tagged_expired() {
    let server = serve_jwks(None).await;
    let state = state_for(&server, Duration::from_secs(300));

    // Past the 60s leeway.
    let token = BearerToken::new(sign_token(&test_keys().private_pem, KID, &base_claims(-300)));

    let err = resolve_context(&state, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Validation(ValidationFailure::Expired)
    ));
}

#[tokio::test]
async fn wrong_audience_and_issuer_are_distinct_failures() {
    let server = serve_jwks(None).await;
    let state = state_for(&server, Duration::from_secs(300));

    let mut claims = base_claims(3600);
    claims["aud"] = json!("other-app");
    let token = BearerToken::new(sign_token(&test_keys().private_pem, KID, &claims));
    let err = resolve_context(&state, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Validation(ValidationFailure::AudienceMismatch)
    ));

    let mut claims = base_claims(3600);
    claims["iss"] = json!("https://rogue.example.com");
    let token = BearerToken::new(sign_token(&test_keys().private_pem, KID, &claims));
    let err = resolve_context(&state, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Validation(ValidationFailure::IssuerMismatch)
    ));
}

#[tokio::test]
async fn foreign_signature_is_rejected() {
    let server = serve_jwks(None).await;
    let state = state_for(&server, Duration::from_secs(300));

    // Signed with a different key under the served kid.
    let token = BearerToken::new(sign_token(
        &test_keys().other_private_pem,
        KID,
        &base_claims(3600),
    ));

    let err = resolve_context(&state, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Validation(ValidationFailure::BadSignature)
    ));
    // A failed validation never reaches the cache.
    assert!(state.cache.is_empty().await);
}

#[tokio::test]
async fn unknown_kid_is_rejected() {
    let server = serve_jwks(None).await;
    let state = state_for(&server, Duration::from_secs(300));

    let token = BearerToken::new(sign_token(
        &test_keys().private_pem,
        "rotated-away",
        &base_claims(3600),
    ));

    let err = resolve_context(&state, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Validation(ValidationFailure::UnknownKey { .. })
    ));
}

#[tokio::test]
async fn cache_entry_expires_with_the_token() {
    let server = serve_jwks(None).await;
    // Cache TTL far longer than the token's remaining life.
    let state = state_for(&server, Duration::from_secs(300));

    let token = BearerToken::new(sign_token(&test_keys().private_pem, KID, &base_claims(2)));

    resolve_context(&state, &token).await.unwrap();
    assert_eq!(state.cache.len().await, 1);

    tokio::time::sleep(Duration::from_secs(3)).await;

    // The entry died with the token; revalidation sees it expired.
    // (Leeway applies to validation, not to the cache bound, so the
    // miss itself proves the entry did not outlive the token.)
    assert!(state.cache.get(&token.fingerprint()).await.is_none());
}

#[tokio::test]
async fn gatekeeper_end_to_end() {
    let server = serve_jwks(None).await;
    let state = state_for(&server, Duration::from_secs(300));

    async fn handler(CurrentTenant(ctx): CurrentTenant) -> String {
        format!("{}:{}", ctx.tenant_id, ctx.user_id)
    }

    let app = Router::new()
        .route("/api/inventory", get(handler))
        .layer(middleware::from_fn_with_state(state, gatekeeper));

    let token = sign_token(&test_keys().private_pem, KID, &base_claims(3600));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/inventory")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"acme:user-1");
}
