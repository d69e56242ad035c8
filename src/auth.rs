use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::err::{breaks, json_body, proceeds, Error, Note, Payload, Reply};
use crate::models::{AdminAccount, AdminProfile};
use crate::validate::required;

pub const TOKEN_COOKIE: &str = "admissions_token";
const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Identity claims embedded in a signed credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: Uuid,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs a 24-hour HS256 credential for the given account. Pure:
/// the cookie side effect belongs to the login handler.
pub fn issue_credential(admin: &AdminAccount, secret: &str) -> Result<String, Error> {
    let now = Utc::now().timestamp();
    let claims = AdminClaims {
        sub: admin.id,
        username: admin.username.clone(),
        role: admin.role.clone(),
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| Error::internal("TokenError", err.to_string()))
}

/// `None` for anything malformed, tampered or expired. Callers treat
/// `None` as "unauthenticated", never as a distinct error class.
pub fn verify_credential(token: &str, secret: &str) -> Option<AdminClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    jsonwebtoken::decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .ok()
}

/// Bearer header first, then the credential cookie.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if !bearer.is_empty() {
            return Some(bearer.to_string());
        }
    }
    cookie_value(headers, TOKEN_COOKIE)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let raw = match header.to_str() {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        for pair in raw.split("; ") {
            if let Some((key, value)) = pair.split_once('=') {
                if key == name && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Strict",
        TOKEN_COOKIE, token, TOKEN_TTL_SECS
    )
}

/// Revocation is overwrite-with-expired: there is no server-side
/// blacklist, a stolen token stays valid until natural expiry.
pub fn expired_cookie() -> String {
    format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict",
        TOKEN_COOKIE
    )
}

pub fn hash_password(plain: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(plain.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Pbkdf2.verify_password(plain.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// The single authorization gate for every admin-scoped route. Routes
/// behind this layer always see verified claims in their extensions;
/// no handler re-implements the check.
pub async fn require_admin(mut req: Request<Body>, next: Next<Body>) -> Response {
    let config = match req.extensions().get::<Arc<Config>>() {
        Some(config) => config.clone(),
        None => {
            return Error::internal("ConfigError", "config extension missing").into_response();
        }
    };
    let claims = extract_credential(req.headers())
        .and_then(|token| verify_credential(&token, &config.token_secret));
    match claims {
        Some(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        None => Error::Unauthenticated.into_response(),
    }
}

/// A success reply that also sets (or clears) the credential cookie.
pub struct WithCookie<V> {
    cookie: String,
    reply: Reply<V>,
}

impl<V: Serialize> IntoResponse for WithCookie<V> {
    fn into_response(self) -> Response {
        let mut response = self.reply.into_response();
        if let Ok(value) = HeaderValue::from_str(&self.cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
        response
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    token: String,
    admin: AdminProfile,
}

pub async fn login(
    Extension(pg): Extension<PgPool>,
    Extension(config): Extension<Arc<Config>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<WithCookie<LoginResponse>, Error> {
    let body = json_body(body)?;
    let username = required("username", body.username.as_deref())?;
    let password = required("password", body.password.as_deref())?;

    let admin =
        sqlx::query_as::<_, AdminAccount>("SELECT * FROM admins WHERE username = $1 LIMIT 1")
            .bind(&username)
            .fetch_optional(&pg)
            .await?;

    // One response for "no such user", "inactive" and "wrong password".
    let admin = match admin {
        Some(admin) if admin.active && verify_password(&password, &admin.password_hash) => admin,
        _ => return Err(Error::Unauthenticated),
    };

    sqlx::query("UPDATE admins SET last_login = $2 WHERE id = $1")
        .bind(admin.id)
        .bind(Utc::now())
        .execute(&pg)
        .await?;

    let token = issue_credential(&admin, &config.token_secret)?;
    Ok(WithCookie {
        cookie: session_cookie(&token),
        reply: Reply::ok(LoginResponse {
            token,
            admin: admin.public_profile(),
        }),
    })
}

pub async fn logout() -> WithCookie<Note> {
    WithCookie {
        cookie: expired_cookie(),
        reply: Reply::ok(Note::says("Logged out")),
    }
}

pub async fn me(
    Extension(claims): Extension<AdminClaims>,
    Extension(pg): Extension<PgPool>,
) -> Payload<AdminProfile> {
    let admin = sqlx::query_as::<_, AdminAccount>("SELECT * FROM admins WHERE id = $1 LIMIT 1")
        .bind(claims.sub)
        .fetch_optional(&pg)
        .await?;
    match admin {
        Some(admin) if admin.active => proceeds(admin.public_profile()),
        _ => breaks(Error::Unauthenticated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_admin() -> AdminAccount {
        AdminAccount {
            id: Uuid::new_v4(),
            username: "registrar".into(),
            email: "registrar@example.edu".into(),
            password_hash: String::new(),
            role: "admin".into(),
            active: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn credential_round_trip() {
        let admin = test_admin();
        let token = issue_credential(&admin, "unit-secret").unwrap();
        let claims = verify_credential(&token, "unit-secret").unwrap();
        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.username, "registrar");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = issue_credential(&test_admin(), "secret-a").unwrap();
        assert!(verify_credential(&token, "secret-b").is_none());
    }

    #[test]
    fn tampered_token_is_invalid() {
        let token = issue_credential(&test_admin(), "unit-secret").unwrap();
        // corrupt the claims segment; the signature no longer matches
        let (head, rest) = token.split_once('.').unwrap();
        let forged = format!("{}.X{}", head, &rest[1..]);
        assert!(verify_credential(&forged, "unit-secret").is_none());
    }

    #[test]
    fn expired_token_is_invalid() {
        let now = Utc::now().timestamp();
        let claims = AdminClaims {
            sub: Uuid::new_v4(),
            username: "registrar".into(),
            role: "admin".into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-secret"),
        )
        .unwrap();
        assert!(verify_credential(&token, "unit-secret").is_none());
    }

    #[test]
    fn garbage_token_is_invalid() {
        assert!(verify_credential("not-a-jwt", "unit-secret").is_none());
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer header-token".parse().unwrap());
        headers.insert(
            COOKIE,
            format!("{}=cookie-token", TOKEN_COOKIE).parse().unwrap(),
        );
        assert_eq!(extract_credential(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn cookie_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            format!("theme=dark; {}=cookie-token", TOKEN_COOKIE)
                .parse()
                .unwrap(),
        );
        assert_eq!(extract_credential(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn absent_credential_extracts_none() {
        assert_eq!(extract_credential(&HeaderMap::new()), None);
    }

    #[test]
    fn cookie_attributes() {
        let set = session_cookie("abc");
        assert!(set.starts_with("admissions_token=abc;"));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Strict"));
        assert!(set.contains("Max-Age=86400"));

        let cleared = expired_cookie();
        assert!(cleared.starts_with("admissions_token=;"));
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }
}
