use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
    RequestPartsExt,
};
use axum_extra::{
    extract::cookie::{Cookie, CookieJar},
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use casbin::{CoreApi, Enforcer};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};
use utoipa::Modify;

use crate::error::AppError;
use crate::flash::Flash;
use crate::model::{Role, User};
use crate::Keys;

pub const SESSION_COOKIE: &str = "hostel_session";

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub exp: i64,
}

/// The caller behind a request, resolved from its session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
}

pub fn issue_token(keys: &Keys, user: &User, ttl: Duration) -> Result<String, AppError> {
    let claims = SessionClaims {
        sub: user.id.to_string(),
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(&Header::default(), &claims, &keys.encoding_session_key)
        .map_err(|e| AppError::Internal(format!("token creation: {e}")))
}

pub fn verify_token(keys: &Keys, token: &str) -> Result<Identity, AppError> {
    let data = decode::<SessionClaims>(token, &keys.decoding_session_key, &Validation::default())
        .map_err(|e| {
            tracing::debug!("verify_token: {}", e);
            AppError::Unauthenticated
        })?;
    let claims = data.claims;
    Ok(Identity {
        user_id: claims.sub.parse().map_err(|_| AppError::Unauthenticated)?,
        name: claims.name,
        email: claims.email,
        role: claims.role,
    })
}

/// Browser-session cookie; the token's own `exp` bounds its validity.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .build()
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Bearer header first, session cookie second.
async fn session_token(parts: &mut Parts) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        parts.extract::<TypedHeader<Authorization<Bearer>>>().await
    {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

pub async fn resolve_identity(parts: &mut Parts, keys: &Keys) -> Option<Identity> {
    let token = session_token(parts).await?;
    verify_token(keys, &token).ok()
}

pub fn require_authenticated(identity: Option<Identity>) -> Result<Identity, AppError> {
    identity.ok_or(AppError::Unauthenticated)
}

/// Asks the policy whether `identity`'s role may perform `action` on `object`.
pub fn permit(
    enforcer: &Enforcer,
    identity: &Identity,
    object: &str,
    action: &str,
) -> Result<(), AppError> {
    if enforcer
        .enforce((identity.role.as_str(), object, action))
        .unwrap_or_default()
    {
        Ok(())
    } else {
        tracing::warn!(
            user_id = identity.user_id,
            role = %identity.role,
            object,
            action,
            "permission denied"
        );
        Err(AppError::Forbidden)
    }
}

pub fn require_admin(enforcer: &Enforcer, identity: Identity) -> Result<Identity, AppError> {
    permit(enforcer, &identity, "admin_area", "access")?;
    Ok(identity)
}

#[async_trait]
impl FromRequestParts<crate::State> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::State,
    ) -> Result<Self, Self::Rejection> {
        require_authenticated(resolve_identity(parts, &state.keys).await)
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct Admin(pub Identity);

#[async_trait]
impl FromRequestParts<crate::State> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::State,
    ) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        require_admin(&state.enforcer, identity).map(Admin)
    }
}

/// Page-route counterpart of `AppError`: every failure becomes a redirect.
#[derive(Debug)]
pub enum PageError {
    Login,
    Dashboard(Flash),
    /// Storage or internal failure; the login page needs no storage.
    Failed(Flash),
}

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Forbidden => PageError::Dashboard(Flash::error("Admin access required")),
            AppError::Unauthenticated | AppError::InvalidCredentials => PageError::Login,
            other => {
                if other.status().is_server_error() {
                    tracing::error!("page failed: {}", other);
                } else {
                    tracing::debug!("page rejected: {}", other);
                }
                PageError::Failed(Flash::error(other.public_message()))
            }
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (flash, to) = match self {
            PageError::Login => return Redirect::to("/login").into_response(),
            PageError::Dashboard(flash) => (flash, "/dashboard"),
            PageError::Failed(flash) => (flash, "/login"),
        };
        (CookieJar::new().add(flash.cookie()), Redirect::to(to)).into_response()
    }
}

/// Any logged-in user viewing a page.
#[derive(Debug, Clone)]
pub struct Viewer(pub Identity);

#[async_trait]
impl FromRequestParts<crate::State> for Viewer {
    type Rejection = PageError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::State,
    ) -> Result<Self, Self::Rejection> {
        Ok(Viewer(Identity::from_request_parts(parts, state).await?))
    }
}

/// An admin viewing an admin page.
#[derive(Debug, Clone)]
pub struct AdminViewer(pub Identity);

#[async_trait]
impl FromRequestParts<crate::State> for AdminViewer {
    type Rejection = PageError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::State,
    ) -> Result<Self, Self::Rejection> {
        let Admin(identity) = Admin::from_request_parts(parts, state).await?;
        Ok(AdminViewer(identity))
    }
}

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_jwt",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, Request};
    use chrono::NaiveDate;

    use super::*;

    fn user(role: Role) -> User {
        User {
            id: 7,
            name: "Aisha Rahman".to_string(),
            email: "aisha@example.com".to_string(),
            phone: None,
            password_hash: String::new(),
            role,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    async fn enforcer() -> Enforcer {
        Enforcer::new(
            concat!(env!("CARGO_MANIFEST_DIR"), "/acl/model.conf"),
            concat!(env!("CARGO_MANIFEST_DIR"), "/acl/policy.csv"),
        )
        .await
        .unwrap()
    }

    fn parts(header_name: header::HeaderName, value: String) -> Parts {
        let (parts, _) = Request::builder()
            .uri("/student/dashboard")
            .header(header_name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn identity_from_bearer_or_cookie() {
        let keys = Keys::new("unit-test-key");
        let token = issue_token(&keys, &user(Role::Student), Duration::hours(1)).unwrap();

        let mut bearer = parts(header::AUTHORIZATION, format!("Bearer {token}"));
        let identity = resolve_identity(&mut bearer, &keys).await.unwrap();
        assert_eq!(identity.user_id, 7);
        assert_eq!(identity.role, Role::Student);

        let mut cookie = parts(header::COOKIE, format!("{SESSION_COOKIE}={token}"));
        assert_eq!(resolve_identity(&mut cookie, &keys).await, Some(identity));
    }

    #[tokio::test]
    async fn expired_or_foreign_tokens_are_anonymous() {
        let keys = Keys::new("unit-test-key");
        let expired = issue_token(&keys, &user(Role::Admin), Duration::hours(-2)).unwrap();
        let mut request = parts(header::AUTHORIZATION, format!("Bearer {expired}"));
        assert_eq!(resolve_identity(&mut request, &keys).await, None);

        let foreign = issue_token(&Keys::new("other-key"), &user(Role::Admin), Duration::hours(1))
            .unwrap();
        let mut request = parts(header::AUTHORIZATION, format!("Bearer {foreign}"));
        assert_eq!(resolve_identity(&mut request, &keys).await, None);
    }

    #[tokio::test]
    async fn admin_predicate_follows_policy() {
        let enforcer = enforcer().await;
        let keys = Keys::new("unit-test-key");
        let admin = verify_token(
            &keys,
            &issue_token(&keys, &user(Role::Admin), Duration::hours(1)).unwrap(),
        )
        .unwrap();
        let student = Identity {
            role: Role::Student,
            ..admin.clone()
        };

        assert_eq!(require_admin(&enforcer, admin.clone()).unwrap(), admin);
        assert!(matches!(
            require_admin(&enforcer, student.clone()),
            Err(AppError::Forbidden)
        ));
        assert!(permit(&enforcer, &student, "booking", "request").is_ok());
        assert!(matches!(
            require_authenticated(None),
            Err(AppError::Unauthenticated)
        ));
    }

    #[test]
    fn page_errors_redirect_with_a_notice() {
        assert!(matches!(PageError::from(AppError::Unauthenticated), PageError::Login));
        match PageError::from(AppError::Forbidden) {
            PageError::Dashboard(flash) => assert_eq!(flash, Flash::error("Admin access required")),
            other => panic!("unexpected {other:?}"),
        }
        match PageError::from(AppError::Storage(diesel::result::Error::NotFound)) {
            PageError::Failed(flash) => assert_eq!(flash, Flash::error("Internal storage error")),
            other => panic!("unexpected {other:?}"),
        }

        let response = PageError::Failed(Flash::error("Storage unavailable")).into_response();
        assert_eq!(response.status(), axum::http::StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }

    #[test]
    fn passwords() {
        let hash = hash_password("admin123").unwrap();
        assert_ne!(hash, "admin123");
        assert!(verify_password("admin123", &hash));
        assert!(!verify_password("admin124", &hash));
        assert!(!verify_password("admin123", "not-a-phc-string"));
        assert_ne!(hash_password("admin123").unwrap(), hash);
    }
}
