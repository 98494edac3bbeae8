use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

use crate::auth::dto::RegisterRequest;
use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\d{10}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trims and checks a registration in place.
pub fn validate_registration(req: &mut RegisterRequest) -> AppResult<()> {
    req.name = req.name.trim().to_string();
    req.email = normalize_email(&req.email);
    req.phone = req.phone.trim().to_string();

    if req.name.is_empty() {
        return Err(AppError::bad_request("Name is required"));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::bad_request("Invalid email"));
    }
    if !is_valid_phone(&req.phone) {
        return Err(AppError::bad_request("Phone number must be 10 digits"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
