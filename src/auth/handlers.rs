use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, SessionIdentity, UsernameResponse},
        extractors::{DefaultRoleUser, FormOrJson, SessionUser},
        password::{hash_password, verify_against_dummy, verify_password},
        session::{removal_cookie, SessionKeys},
    },
    state::AppState,
    users::repo::StoreError,
    users::repo_types::NewUser,
    views::{render_template, DashboardTemplate, LoginTemplate, RegisterTemplate},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard))
        .route("/username", get(username))
}

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

pub async fn register_page() -> Response {
    render_template(StatusCode::OK, RegisterTemplate { error: None })
}

pub async fn login_page() -> Response {
    render_template(StatusCode::OK, LoginTemplate { error: None })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    FormOrJson(payload): FormOrJson<RegisterRequest>,
) -> Response {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        warn!("register with missing fields");
        return render_template(
            StatusCode::BAD_REQUEST,
            RegisterTemplate {
                error: Some("Username and password are required".into()),
            },
        );
    }

    let hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error during registration").into_response();
        }
    };

    match state
        .store
        .create_user(NewUser::with_defaults(username, hash))
        .await
    {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, "user registered");
            Redirect::to("/login").into_response()
        }
        Err(StoreError::Conflict(_)) => {
            warn!(%username, "username already registered");
            render_template(
                StatusCode::CONFLICT,
                RegisterTemplate {
                    error: Some("Username is already taken".into()),
                },
            )
        }
        Err(StoreError::Backend(e)) => {
            error!(error = ?e, "create user failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error during registration").into_response()
        }
    }
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    FormOrJson(payload): FormOrJson<LoginRequest>,
) -> Response {
    let username = payload.username.trim();

    let user = match state.store.find_by_username(username).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "find_by_username failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "An error occurred during login")
                .into_response();
        }
    };

    // Unknown user and wrong password must be indistinguishable to the client.
    let verified = match &user {
        Some(u) => verify_password(&payload.password, &u.password_hash).unwrap_or_else(|e| {
            error!(error = %e, username = %u.username, "stored hash unreadable");
            false
        }),
        None => {
            verify_against_dummy(&payload.password);
            false
        }
    };
    let Some(user) = user.filter(|_| verified) else {
        warn!(%username, "login rejected");
        return (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS).into_response();
    };

    let keys = SessionKeys::from_ref(&state);
    let cookie = match keys.cookie(&SessionIdentity::from(&user)) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "session sign failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "An error occurred during login")
                .into_response();
        }
    };

    info!(user_id = %user.id, username = %user.username, "user logged in");
    (jar.add(cookie), Redirect::to("/dashboard")).into_response()
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (jar.remove(removal_cookie()), Redirect::to("/login"))
}

#[instrument(skip(state, jar, identity), fields(username = %identity.username))]
pub async fn dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
    DefaultRoleUser(identity): DefaultRoleUser,
) -> Response {
    let user = match state.store.find_by_username(&identity.username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!("session for missing user");
            return (jar.remove(removal_cookie()), Redirect::to("/login")).into_response();
        }
        Err(e) => {
            error!(error = %e, "dashboard lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error loading dashboard").into_response();
        }
    };

    render_template(
        StatusCode::OK,
        DashboardTemplate {
            username: user.username,
            display_name: user.display_name,
            profile_picture: user.profile_picture,
        },
    )
}

pub async fn username(SessionUser(identity): SessionUser) -> Json<UsernameResponse> {
    Json(UsernameResponse {
        username: identity.username,
    })
}
