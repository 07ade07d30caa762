use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::{
    revoked_token,
    user::{self, PublicUser, Role},
};
use crate::error::ServiceError;
use crate::integrations::{IdentityError, IdentityVerifier, Mailer, OutboundEmail};
use crate::middleware::auth::{decode_token, generate_token, generate_token_pair, TokenKind, TokenPair};

#[derive(Clone, Debug, Serialize)]
pub struct AuthSession {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[derive(Clone, Deserialize, Validate)]
pub struct Registration {
    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProfilePatch {
    #[validate(length(max = 150, message = "must be at most 150 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "must be at most 150 characters"))]
    pub last_name: Option<String>,
    #[validate(length(max = 20, message = "must be at most 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Deserialize, Validate)]
pub struct PasswordReset {
    #[serde(default)]
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Serialize, Deserialize)]
struct ResetClaims {
    user_id: i32,
    exp: usize,
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ServiceError::Internal(format!("Failed to hash password: {err}")))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn find_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> Result<Option<user::Model>, ServiceError> {
    Ok(user::Entity::find()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(conn)
        .await?)
}

async fn find_active<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<user::Model, ServiceError> {
    match user::Entity::find_by_id(user_id).one(conn).await? {
        Some(user) if user.is_active => Ok(user),
        _ => Err(ServiceError::Unauthorized("Invalid user".into())),
    }
}

fn session(config: &AppConfig, user: &user::Model) -> Result<AuthSession, ServiceError> {
    Ok(AuthSession {
        user: user.public(),
        tokens: generate_token_pair(config, user.id, user.role)?,
    })
}

pub async fn register(
    db: &DatabaseConnection,
    config: &AppConfig,
    payload: Registration,
) -> Result<AuthSession, ServiceError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ServiceError::validation("Email and password are required"));
    }
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if find_by_email(db, &email).await?.is_some() {
        return Err(ServiceError::validation("User with this email already exists"));
    }

    let created = user::ActiveModel {
        email: Set(email),
        password: Set(Some(hash_password(&payload.password)?)),
        first_name: Set(payload.first_name.trim().to_owned()),
        last_name: Set(payload.last_name.trim().to_owned()),
        is_active: Set(true),
        is_google_user: Set(false),
        role: Set(Role::User),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::validation("User with this email already exists")
        }
        _ => ServiceError::from(err),
    })?;

    info!(user_id = created.id, "User registered");
    session(config, &created)
}

pub async fn login(
    db: &DatabaseConnection,
    config: &AppConfig,
    payload: Credentials,
) -> Result<AuthSession, ServiceError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ServiceError::validation("Email and password are required"));
    }
    let invalid = || ServiceError::Unauthorized("Invalid email or password".into());

    let user = find_by_email(db, &payload.email).await?.ok_or_else(invalid)?;
    user.check_hash(&payload.password).map_err(|_| invalid())?;
    if !user.is_active {
        return Err(ServiceError::Unauthorized("Account is disabled".into()));
    }

    info!(user_id = user.id, "User logged in");
    session(config, &user)
}

pub async fn google_login(
    db: &DatabaseConnection,
    config: &AppConfig,
    verifier: &dyn IdentityVerifier,
    id_token: &str,
) -> Result<AuthSession, ServiceError> {
    if id_token.trim().is_empty() {
        return Err(ServiceError::validation("Token is required"));
    }
    let identity = verifier.verify(id_token).await.map_err(|err| match err {
        IdentityError::InvalidToken => ServiceError::validation("Invalid token"),
        IdentityError::NotConfigured => ServiceError::Internal(err.to_string()),
        IdentityError::Unavailable(_) => ServiceError::Gateway(err.to_string()),
    })?;

    let user = match find_by_email(db, &identity.email).await? {
        Some(user) if !user.is_active => {
            return Err(ServiceError::Unauthorized("Account is disabled".into()))
        }
        Some(user) => user,
        None => {
            let created = user::ActiveModel {
                email: Set(normalize_email(&identity.email)),
                password: Set(None),
                first_name: Set(identity.given_name),
                last_name: Set(identity.family_name),
                is_active: Set(true),
                is_google_user: Set(true),
                role: Set(Role::User),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(db)
            .await?;
            info!(user_id = created.id, "User created from Google sign-in");
            created
        }
    };

    session(config, &user)
}

/// New access token for a refresh token that has not been revoked.
pub async fn refresh(
    db: &DatabaseConnection,
    config: &AppConfig,
    refresh_token: &str,
) -> Result<String, ServiceError> {
    let claims = decode_token(config, refresh_token, TokenKind::Refresh)?;
    if revoked_token::Entity::find_by_id(claims.jti.clone())
        .one(db)
        .await?
        .is_some()
    {
        return Err(ServiceError::Unauthorized("Token has been revoked".into()));
    }
    let user = find_active(db, claims.user_id).await?;
    Ok(generate_token(config, user.id, user.role, TokenKind::Access)?.token)
}

pub async fn logout(
    db: &DatabaseConnection,
    config: &AppConfig,
    user_id: i32,
    refresh_token: &str,
) -> Result<(), ServiceError> {
    if refresh_token.trim().is_empty() {
        return Err(ServiceError::validation("Refresh token is required"));
    }
    let rejected = || ServiceError::validation("Invalid token or already logged out");

    let claims =
        decode_token(config, refresh_token, TokenKind::Refresh).map_err(|_| rejected())?;
    if claims.user_id != user_id {
        return Err(rejected());
    }

    revoked_token::ActiveModel {
        jti: Set(claims.jti),
        user_id: Set(user_id),
        expires_at: Set(chrono::DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or_else(Utc::now)),
        revoked_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => rejected(),
        _ => ServiceError::from(err),
    })?;

    info!(user_id, "User logged out");
    Ok(())
}

pub async fn profile(db: &DatabaseConnection, user_id: i32) -> Result<PublicUser, ServiceError> {
    Ok(find_active(db, user_id).await?.public())
}

pub async fn update_profile(
    db: &DatabaseConnection,
    user_id: i32,
    patch: ProfilePatch,
) -> Result<PublicUser, ServiceError> {
    patch.validate()?;
    let mut active: user::ActiveModel = find_active(db, user_id).await?.into();
    if let Some(first_name) = patch.first_name {
        active.first_name = Set(first_name.trim().to_owned());
    }
    if let Some(last_name) = patch.last_name {
        active.last_name = Set(last_name.trim().to_owned());
    }
    if let Some(phone) = patch.phone {
        active.phone = Set(Some(phone.trim().to_owned()).filter(|p| !p.is_empty()));
    }
    if let Some(address) = patch.address {
        active.address = Set(Some(address.trim().to_owned()).filter(|a| !a.is_empty()));
    }
    Ok(active.update(db).await?.public())
}

//Password reset
fn reset_key(config: &AppConfig, user: &user::Model) -> Vec<u8> {
    // Keyed on the current hash so a used link dies with the old password.
    format!("{}{}", config.jwt_secret, user.password.as_deref().unwrap_or_default()).into_bytes()
}

pub fn encode_uid(user_id: i32) -> String {
    URL_SAFE_NO_PAD.encode(user_id.to_string())
}

fn decode_uid(uid: &str) -> Option<i32> {
    let bytes = URL_SAFE_NO_PAD.decode(uid).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn reset_token(config: &AppConfig, user: &user::Model) -> Result<String, ServiceError> {
    let exp = Utc::now()
        .checked_add_signed(config.reset_token_ttl)
        .ok_or_else(|| ServiceError::Internal("Reset token expiry overflow".into()))?
        .timestamp() as usize;
    encode(
        &Header::default(),
        &ResetClaims {
            user_id: user.id,
            exp,
        },
        &EncodingKey::from_secret(&reset_key(config, user)),
    )
    .map_err(|err| ServiceError::Internal(format!("Failed to sign reset token: {err}")))
}

/// Mails a reset link when the address belongs to a password account. The
/// caller always reports success so addresses cannot be probed.
pub async fn forgot_password(
    db: &DatabaseConnection,
    config: &AppConfig,
    mailer: &dyn Mailer,
    email: &str,
) -> Result<(), ServiceError> {
    let Some(user) = find_by_email(db, email).await? else {
        return Ok(());
    };
    if !user.is_active || user.password.is_none() {
        return Ok(());
    }

    let link = format!(
        "{}/reset-password/{}/{}",
        config.frontend_url.trim_end_matches('/'),
        encode_uid(user.id),
        reset_token(config, &user)?
    );
    let message = OutboundEmail {
        to: user.email.clone(),
        subject: "Reset your password".into(),
        body: format!(
            "We received a request to reset your password.\n\nOpen this link to choose a new one:\n{link}\n\nIf you did not ask for this, ignore this email."
        ),
    };
    if let Err(err) = mailer.send(message).await {
        warn!(user_id = user.id, error = %err, "Failed to send password reset email");
    }
    Ok(())
}

async fn check_reset<C: ConnectionTrait>(
    conn: &C,
    config: &AppConfig,
    uid: &str,
    token: &str,
) -> Result<user::Model, ServiceError> {
    let invalid = || ServiceError::validation("Invalid or expired reset link");
    let user_id = decode_uid(uid).ok_or_else(invalid)?;
    let user = user::Entity::find_by_id(user_id)
        .one(conn)
        .await?
        .filter(|u| u.is_active && u.password.is_some())
        .ok_or_else(invalid)?;

    let claims = decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(&reset_key(config, &user)),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| invalid())?
    .claims;
    if claims.user_id != user.id {
        return Err(invalid());
    }
    Ok(user)
}

pub async fn validate_reset_token(
    db: &DatabaseConnection,
    config: &AppConfig,
    uid: &str,
    token: &str,
) -> Result<(), ServiceError> {
    check_reset(db, config, uid, token).await.map(|_| ())
}

pub async fn reset_password(
    db: &DatabaseConnection,
    config: &AppConfig,
    uid: &str,
    token: &str,
    payload: PasswordReset,
) -> Result<(), ServiceError> {
    if payload.password != payload.confirm_password {
        return Err(ServiceError::validation("Passwords do not match"));
    }
    payload.validate()?;

    let user = check_reset(db, config, uid, token).await?;
    let user_id = user.id;
    let mut active: user::ActiveModel = user.into();
    active.password = Set(Some(hash_password(&payload.password)?));
    active.update(db).await?;

    info!(user_id, "Password reset");
    Ok(())
}

/// Creates an administrator, or promotes and re-keys an existing account.
pub async fn create_admin(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<user::Model, ServiceError> {
    if password.len() < 8 {
        return Err(ServiceError::validation("password: must be at least 8 characters"));
    }
    let hash = hash_password(password)?;
    let saved = match find_by_email(db, email).await? {
        Some(existing) => {
            let mut active: user::ActiveModel = existing.into();
            active.password = Set(Some(hash));
            active.role = Set(Role::Admin);
            active.is_active = Set(true);
            active.update(db).await?
        }
        None => {
            user::ActiveModel {
                email: Set(normalize_email(email)),
                password: Set(Some(hash)),
                first_name: Set(String::new()),
                last_name: Set(String::new()),
                is_active: Set(true),
                is_google_user: Set(false),
                role: Set(Role::Admin),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };
    info!(user_id = saved.id, "Administrator account ready");
    Ok(saved)
}
