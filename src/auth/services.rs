use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::PublicUser,
        password::{hash_password, verify_password},
    },
    error::AppError,
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims, lowercases and validates an email used as a login key.
fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::MissingField("email"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email"));
    }
    Ok(email)
}

#[instrument(skip(st, password))]
pub async fn register(st: &AppState, email: &str, password: &str) -> Result<PublicUser, AppError> {
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(AppError::MissingField("password"));
    }

    if st.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::DuplicateUser);
    }

    let hash = hash_password(password)?;
    let user = st.users.create(&email, &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user.into())
}

#[instrument(skip(st, password))]
pub async fn login(st: &AppState, email: &str, password: &str) -> Result<PublicUser, AppError> {
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(AppError::MissingField("password"));
    }

    let Some(user) = st.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::NotFound("User"));
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredential);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user.into())
}
