use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String, // Argon2 PHC string
    pub role: Role,
    pub is_approved: bool,
    pub approved_date: Option<OffsetDateTime>,
    pub approved_by: Option<Uuid>,
    pub qr_code: Option<String>,      // PNG data URL
    pub qr_code_data: Option<String>, // JSON string encoded in qr_code
    pub event_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// User joined with the admin who approved them.
#[derive(Debug, Clone, FromRow)]
pub struct UserWithApprover {
    #[sqlx(flatten)]
    pub user: User,
    pub approver_name: Option<String>,
    pub approver_email: Option<String>,
}

/// Fields for inserting a user.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub is_approved: bool,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct UserCounts {
    pub total_users: i64,
    pub approved_users: i64,
    pub pending_users: i64,
    pub recent_registrations: i64,
    pub total_scans: i64,
}

/// Optional filters for the admin user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub approved: Option<bool>,
}
