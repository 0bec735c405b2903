use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::CookieJar;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::dto::SessionIdentity;
use super::session::{SessionKeys, SESSION_COOKIE};
use crate::users::repo_types::Role;

/// Verified session taken from the `userData` cookie.
pub struct SessionUser(pub SessionIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or((StatusCode::UNAUTHORIZED, "You are not logged in".to_string()))?;

        match keys.verify(&token) {
            Ok(identity) => Ok(SessionUser(identity)),
            Err(e) => {
                warn!(error = %e, "invalid or expired session");
                Err((StatusCode::UNAUTHORIZED, "You are not logged in".to_string()))
            }
        }
    }
}

/// Session gate that lets through only the default `user` role and turns
/// away every other role, `admin` included.
pub fn only_default_role_allowed(role: &Role) -> bool {
    *role == Role::User
}

/// A [`SessionUser`] that also passed [`only_default_role_allowed`].
pub struct DefaultRoleUser(pub SessionIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for DefaultRoleUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let SessionUser(identity) = SessionUser::from_request_parts(parts, state).await?;
        if !only_default_role_allowed(&identity.role) {
            warn!(username = %identity.username, role = identity.role.as_str(), "role gate denied");
            return Err((
                StatusCode::FORBIDDEN,
                "Forbidden: only the default user role may access this page".to_string(),
            ));
        }
        Ok(DefaultRoleUser(identity))
    }
}

/// Body that may arrive as an HTML form post or as JSON.
pub struct FormOrJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);
        if is_json {
            let Json(v) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(FormOrJson(v))
        } else {
            let Form(v) = Form::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(FormOrJson(v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fakes::test_config;
    use axum::http::{header, Request};

    fn keys() -> SessionKeys {
        SessionKeys::from_config(&test_config().session)
    }

    fn parts_with_cookie(cookie: Option<String>) -> Parts {
        let mut req = Request::builder().uri("/");
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        req.body(()).unwrap().into_parts().0
    }

    fn identity(role: Role) -> SessionIdentity {
        SessionIdentity {
            username: "alice".into(),
            display_name: "Alice".into(),
            role,
        }
    }

    #[test]
    fn role_gate_admits_only_default_role() {
        assert!(only_default_role_allowed(&Role::User));
        assert!(!only_default_role_allowed(&Role::Admin));
        assert!(!only_default_role_allowed(&Role::Other("guest".into())));
    }

    #[tokio::test]
    async fn missing_cookie_is_unauthorized() {
        let k = keys();
        let mut parts = parts_with_cookie(None);
        let err = SessionUser::from_request_parts(&mut parts, &k).await.err().unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_cookie_is_unauthorized() {
        let k = keys();
        let mut parts = parts_with_cookie(Some("userData=%7Bnot-json".into()));
        let err = SessionUser::from_request_parts(&mut parts, &k).await.err().unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_cookie_attaches_identity() {
        let k = keys();
        let token = k.sign(&identity(Role::User)).unwrap();
        let mut parts = parts_with_cookie(Some(format!("userData={token}")));
        let SessionUser(id) = SessionUser::from_request_parts(&mut parts, &k).await.unwrap();
        assert_eq!(id.username, "alice");
        assert_eq!(id.display_name, "Alice");
    }

    #[tokio::test]
    async fn admin_session_is_forbidden_by_role_gate() {
        let k = keys();
        let token = k.sign(&identity(Role::Admin)).unwrap();
        let mut parts = parts_with_cookie(Some(format!("userData={token}")));
        let err = DefaultRoleUser::from_request_parts(&mut parts, &k)
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }
}
