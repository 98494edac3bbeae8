use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::{AdminUser, CurrentUser},
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
    pagination::Pagination,
    state::AppState,
    users::{
        dto::{
            MessageResponse, UpdateUserRequest, UpdateUserResponse, UserListQuery,
            UserListResponse, UserOverview, UserResponse, UserView,
        },
        repo_types::{User, UserFilter},
        services::{ensure_self_or_admin, overview, ProfileUpdate},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/stats/overview", get(stats_overview))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    AppQuery(page): AppQuery<Pagination>,
    AppQuery(query): AppQuery<UserListQuery>,
) -> AppResult<Json<UserListResponse>> {
    let search = query.search.trim();
    let filter = UserFilter {
        search: (!search.is_empty()).then(|| search.to_string()),
        approved: query.status.approved(),
    };

    let rows = User::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = User::count(&state.db, &filter).await?;

    Ok(Json(UserListResponse {
        users: rows.into_iter().map(UserView::from).collect(),
        page: page.meta(total),
    }))
}

#[instrument(skip(state, actor))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<UserResponse>> {
    ensure_self_or_admin(&actor, id)?;
    let row = User::find_with_approver(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(UserResponse {
        user: UserView::from(row),
    }))
}

#[instrument(skip(state, actor, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<UpdateUserResponse>> {
    ensure_self_or_admin(&actor, id)?;
    let update = ProfileUpdate::from_request(payload)?;

    User::update_profile(
        &state.db,
        id,
        update.name.as_deref(),
        update.phone.as_deref(),
    )
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))?;

    let row = User::find_with_approver(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    info!(user_id = %id, actor_id = %actor.id, "profile updated");
    Ok(Json(UpdateUserResponse {
        message: "Profile updated successfully",
        user: UserView::from(row),
    }))
}

#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    if !User::delete_with_scans(&state.db, id).await? {
        return Err(AppError::not_found("User not found"));
    }
    info!(user_id = %id, admin_id = %admin.id, "user deleted with scan history");
    Ok(Json(MessageResponse {
        message: "User deleted successfully",
    }))
}

#[instrument(skip(state, _admin))]
pub async fn stats_overview(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<UserOverview>> {
    let counts = User::counts(&state.db).await?;
    Ok(Json(overview(counts)))
}
