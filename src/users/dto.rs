use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::pagination::PageMeta;
use crate::users::repo_types::{Role, User, UserWithApprover};

/// Minimal reference to another user, used where records are populated.
#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// User as returned by the API. Never carries the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub is_approved: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub approved_date: Option<OffsetDateTime>,
    pub approved_by: Option<UserRef>,
    pub qr_code: Option<String>,
    pub qr_code_data: Option<String>,
    pub event_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserView {
    pub fn new(user: User, approved_by: Option<UserRef>) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            is_approved: user.is_approved,
            approved_date: user.approved_date,
            approved_by,
            qr_code: user.qr_code,
            qr_code_data: user.qr_code_data,
            event_id: user.event_id,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<UserWithApprover> for UserView {
    fn from(row: UserWithApprover) -> Self {
        let approver = match (row.user.approved_by, row.approver_name, row.approver_email) {
            (Some(id), Some(name), Some(email)) => Some(UserRef { id, name, email }),
            _ => None,
        };
        UserView::new(row.user, approver)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Approved,
    Pending,
}

impl StatusFilter {
    pub fn approved(self) -> Option<bool> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Approved => Some(true),
            StatusFilter::Pending => Some(false),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub status: StatusFilter,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserView>,
    #[serde(flatten)]
    pub page: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserView,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateUserResponse {
    pub message: &'static str,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    pub total_users: i64,
    pub approved_users: i64,
    pub pending_users: i64,
    pub total_scans: i64,
    pub recent_registrations: i64,
    pub approval_rate: f64,
}
