use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use tracing::instrument;

use crate::{
    error::AppResult,
    setup::{
        dto::{AdminStatus, AdminSummary, CreateAdminResponse, SetupUserRow, SetupUsersResponse},
        services::{ensure_admin, BootstrapAction},
    },
    state::AppState,
    users::repo_types::{Role, User},
};

pub fn setup_routes() -> Router<AppState> {
    Router::new()
        .route("/setup/create-admin", post(create_admin))
        .route("/setup/check-admin", get(check_admin))
        .route("/setup/users", get(setup_users))
}

#[instrument(skip(state))]
pub async fn create_admin(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<CreateAdminResponse>)> {
    let outcome = ensure_admin(&state.db, &state.config.admin).await?;
    let status = match outcome.action {
        BootstrapAction::Create => StatusCode::CREATED,
        BootstrapAction::Promote | BootstrapAction::Keep => StatusCode::OK,
    };
    Ok((
        status,
        Json(CreateAdminResponse {
            message: outcome.action.message(),
            success: true,
            admin: AdminSummary::from(&outcome.admin),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn check_admin(State(state): State<AppState>) -> AppResult<Json<AdminStatus>> {
    let admin_count = User::count_by_role(&state.db, Role::Admin).await?;
    let total_users = User::count_all(&state.db).await?;
    let admin_user = User::first_admin(&state.db).await?;
    Ok(Json(AdminStatus::new(
        admin_count,
        total_users,
        admin_user.as_ref().map(AdminSummary::from),
    )))
}

#[instrument(skip(state))]
pub async fn setup_users(State(state): State<AppState>) -> AppResult<Json<SetupUsersResponse>> {
    let users: Vec<SetupUserRow> = User::list_all(&state.db)
        .await?
        .into_iter()
        .map(SetupUserRow::from)
        .collect();
    Ok(Json(SetupUsersResponse {
        count: users.len(),
        users,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_without_admin_needs_setup() {
        let status = AdminStatus::new(0, 4, None);
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["hasAdmin"], false);
        assert_eq!(v["needsSetup"], true);
        assert_eq!(v["totalUsers"], 4);
        assert!(v["adminUser"].is_null());
    }

    #[test]
    fn status_with_admin_is_ready() {
        let summary = AdminSummary {
            id: uuid::Uuid::new_v4(),
            name: "Admin User".into(),
            email: "admin@example.com".into(),
            role: Role::Admin,
        };
        let v = serde_json::to_value(AdminStatus::new(1, 1, Some(summary))).unwrap();
        assert_eq!(v["hasAdmin"], true);
        assert_eq!(v["needsSetup"], false);
        assert_eq!(v["adminUser"]["role"], "admin");
    }
}
