use sqlx::PgPool;
use tracing::info;

use crate::{
    auth::services::hash_password,
    config::AdminConfig,
    users::repo_types::{NewUser, Role, User},
};

/// Step taken by the admin bootstrap for the configured admin email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapAction {
    /// No account with that email: create one.
    Create,
    /// A regular user owns that email: promote and approve them.
    Promote,
    /// The account is already an admin.
    Keep,
}

impl BootstrapAction {
    pub fn plan(existing: Option<&User>) -> Self {
        match existing {
            None => BootstrapAction::Create,
            Some(u) if u.is_admin() => BootstrapAction::Keep,
            Some(_) => BootstrapAction::Promote,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            BootstrapAction::Create => "Admin user created successfully",
            BootstrapAction::Promote => "Existing user updated to admin",
            BootstrapAction::Keep => "Admin already exists",
        }
    }
}

pub struct Bootstrap {
    pub action: BootstrapAction,
    pub admin: User,
}

/// Makes sure the configured admin account exists and holds the admin role.
pub async fn ensure_admin(db: &PgPool, cfg: &AdminConfig) -> anyhow::Result<Bootstrap> {
    let existing = User::find_by_email(db, &cfg.email).await?;
    let action = BootstrapAction::plan(existing.as_ref());

    let admin = match (action, existing) {
        (BootstrapAction::Keep, Some(user)) => user,
        (BootstrapAction::Promote, Some(user)) => User::promote_to_admin(db, user.id).await?,
        _ => {
            let hash = hash_password(&cfg.password)?;
            User::create(
                db,
                NewUser {
                    name: &cfg.name,
                    email: &cfg.email,
                    phone: &cfg.phone,
                    password_hash: &hash,
                    role: Role::Admin,
                    is_approved: true,
                },
            )
            .await?
        }
    };

    info!(user_id = %admin.id, email = %admin.email, action = ?action, "admin bootstrap");
    Ok(Bootstrap { action, admin })
}
