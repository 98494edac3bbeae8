use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{Role, User};

#[derive(Debug, Serialize)]
pub struct AdminSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for AdminSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateAdminResponse {
    pub message: &'static str,
    pub success: bool,
    pub admin: AdminSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub has_admin: bool,
    pub admin_count: i64,
    pub total_users: i64,
    pub admin_user: Option<AdminSummary>,
    pub needs_setup: bool,
}

impl AdminStatus {
    pub fn new(admin_count: i64, total_users: i64, admin_user: Option<AdminSummary>) -> Self {
        Self {
            has_admin: admin_count > 0,
            admin_count,
            total_users,
            admin_user,
            needs_setup: admin_count == 0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupUserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_approved: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for SetupUserRow {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            is_approved: u.is_approved,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetupUsersResponse {
    pub users: Vec<SetupUserRow>,
    pub count: usize,
}
