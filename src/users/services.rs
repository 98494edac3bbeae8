use uuid::Uuid;

use crate::auth::services::is_valid_phone;
use crate::error::{AppError, AppResult};
use crate::qr::services::percent_of;
use crate::users::dto::{UpdateUserRequest, UserOverview};
use crate::users::repo_types::{User, UserCounts};

/// Users may act on their own record; admins on any.
pub fn ensure_self_or_admin(actor: &User, target: Uuid) -> AppResult<()> {
    if actor.is_admin() || actor.id == target {
        Ok(())
    } else {
        Err(AppError::forbidden("Access denied"))
    }
}

/// Normalised profile edit. Blank fields mean "leave unchanged".
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn from_request(req: UpdateUserRequest) -> AppResult<Self> {
        let name = req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let phone = req
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        if let Some(phone) = &phone {
            if !is_valid_phone(phone) {
                return Err(AppError::bad_request("Phone number must be 10 digits"));
            }
        }
        Ok(Self { name, phone })
    }
}

pub fn overview(counts: UserCounts) -> UserOverview {
    UserOverview {
        total_users: counts.total_users,
        approved_users: counts.approved_users,
        pending_users: counts.pending_users,
        total_scans: counts.total_scans,
        recent_registrations: counts.recent_registrations,
        approval_rate: percent_of(counts.approved_users, counts.total_users),
    }
}
