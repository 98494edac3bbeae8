use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
        extractors::CurrentUser,
        jwt::JwtKeys,
        services::{hash_password, is_valid_email, normalize_email, validate_registration, verify_password},
    },
    error::{AppError, AppResult},
    extract::AppJson,
    state::AppState,
    users::{
        dto::UserView,
        repo::is_unique_violation,
        repo_types::{NewUser, Role, User},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(get_me))
}

fn email_taken() -> AppError {
    AppError::Conflict("Email already registered".into())
}

fn issue(state: &AppState, user: User) -> AppResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let (access_token, refresh_token) = keys.sign_pair(user.id)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: UserView::new(user, None),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(mut payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    if let Err(e) = validate_registration(&mut payload) {
        warn!(email = %payload.email, error = %e, "registration rejected");
        return Err(e);
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(email_taken());
    }

    let hash = hash_password(&payload.password)?;
    let created = User::create(
        &state.db,
        NewUser {
            name: &payload.name,
            email: &payload.email,
            phone: &payload.phone,
            password_hash: &hash,
            role: Role::User,
            is_approved: false,
        },
    )
    .await;
    let user = match created {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %payload.email, "email registered concurrently");
            return Err(email_taken());
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(issue(&state, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::unauthorized("Invalid credentials"));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(issue(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::unauthorized(e.to_string()))?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    Ok(Json(issue(&state, user)?))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(UserView::new(user, None))
}
