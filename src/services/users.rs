//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::{AuthConfig, BootstrapAdmin},
    error::{AppError, AppResult},
    models::user::{
        CreateUser, Identity, NewUser, RegisterUser, Role, TokenPair, TokenType, UpdateProfile,
        UpdateUser, User, UserChanges, UserClaims,
    },
    repository::Repository,
};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Self-service registration; new accounts are always members
    pub async fn register(&self, request: RegisterUser) -> AppResult<User> {
        request.validate()?;

        let user = self
            .repository
            .users
            .create(&NewUser {
                email: normalize_email(&request.email),
                username: request.username.trim().to_string(),
                first_name: request.first_name,
                last_name: request.last_name,
                password_hash: self.hash_password(&request.password)?,
                role: Role::Member,
            })
            .await?;

        tracing::info!("User {} registered", user.id);
        Ok(user)
    }

    /// Authenticate by email and password and issue a token pair
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<(TokenPair, User)> {
        let user = self
            .repository
            .users
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        if !user.is_active || !self.verify_password(&user, password)? {
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        let tokens = self.issue_tokens(&user)?;
        Ok((tokens, user))
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = UserClaims::from_token(refresh_token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Token is invalid or expired".to_string()))?;
        if claims.token_type != TokenType::Refresh {
            return Err(AppError::Authentication("Token has wrong type".to_string()));
        }

        let user = self.repository.users.get(claims.user_id).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::Authentication(INVALID_CREDENTIALS.to_string()),
            other => other,
        })?;
        if !user.is_active {
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        Ok(TokenPair {
            access: self.create_token(&user, TokenType::Access)?,
            refresh: refresh_token.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_minutes * 60,
        })
    }

    /// Load the account behind verified access-token claims.
    ///
    /// Deleted and deactivated accounts are rejected, so a token outliving
    /// its account grants nothing.
    pub async fn resolve_access(&self, claims: &UserClaims) -> AppResult<User> {
        let user = self.repository.users.get(claims.user_id).await.map_err(|e| match e {
            AppError::NotFound(_) => {
                AppError::Authentication("User not found".to_string())
            }
            other => other,
        })?;
        if !user.is_active {
            tracing::debug!("Rejected token for inactive user {}", user.id);
            return Err(AppError::Authentication("User is inactive".to_string()));
        }
        Ok(user)
    }

    fn issue_tokens(&self, user: &User) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access: self.create_token(user, TokenType::Access)?,
            refresh: self.create_token(user, TokenType::Refresh)?,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_minutes * 60,
        })
    }

    /// Create JWT token for a user
    fn create_token(&self, user: &User, token_type: TokenType) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let lifetime = match token_type {
            TokenType::Access => self.config.access_token_minutes * 60,
            TokenType::Refresh => self.config.refresh_token_hours * 3600,
        };

        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            token_type,
            exp: now + lifetime,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Verify user password
    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    pub async fn list_users(&self, actor: &Identity) -> AppResult<Vec<User>> {
        actor.require_admin()?;
        self.repository.users.list().await
    }

    pub async fn get_user(&self, actor: &Identity, id: i64) -> AppResult<User> {
        actor.require_admin()?;
        self.repository.users.get(id).await
    }

    /// Create a user with any role (admin only)
    pub async fn create_user(&self, actor: &Identity, request: CreateUser) -> AppResult<User> {
        actor.require_admin()?;
        request.validate()?;

        let user = self
            .repository
            .users
            .create(&NewUser {
                email: normalize_email(&request.email),
                username: request.username.trim().to_string(),
                first_name: request.first_name,
                last_name: request.last_name,
                password_hash: self.hash_password(&request.password)?,
                role: request.role.unwrap_or(Role::Member),
            })
            .await?;

        tracing::info!("User {} created by administrator {} with role {}", user.id, actor.user_id, user.role);
        Ok(user)
    }

    /// Update role, activity or names of a user (admin only)
    pub async fn update_user(&self, actor: &Identity, id: i64, request: UpdateUser) -> AppResult<User> {
        actor.require_admin()?;
        request.validate()?;

        if id == actor.user_id
            && (request.role == Some(Role::Member) || request.is_active == Some(false))
        {
            return Err(AppError::BadRequest(
                "Administrators cannot demote or deactivate themselves.".to_string(),
            ));
        }

        let changes = UserChanges {
            username: request.username.map(|u| u.trim().to_string()),
            first_name: request.first_name,
            last_name: request.last_name,
            role: request.role,
            is_active: request.is_active,
            password_hash: None,
        };
        self.repository.users.update(id, &changes).await
    }

    /// Deactivate a user; loan and review history is kept
    pub async fn deactivate_user(&self, actor: &Identity, id: i64) -> AppResult<()> {
        self.update_user(
            actor,
            id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
        tracing::info!("User {} deactivated by administrator {}", id, actor.user_id);
        Ok(())
    }

    /// Update user's own profile (names, username, password)
    pub async fn update_profile(&self, user_id: i64, profile: UpdateProfile) -> AppResult<User> {
        profile.validate()?;

        let user = self.repository.users.get(user_id).await?;

        // If changing password, verify current password
        let password_hash = match profile.new_password {
            Some(ref new_password) => {
                let current_password = profile.current_password.as_ref().ok_or_else(|| {
                    AppError::Validation("Current password required to change password".to_string())
                })?;
                if !self.verify_password(&user, current_password)? {
                    return Err(AppError::Authentication(
                        "Current password is incorrect".to_string(),
                    ));
                }
                Some(self.hash_password(new_password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            username: profile.username.map(|u| u.trim().to_string()),
            first_name: profile.first_name,
            last_name: profile.last_name,
            password_hash,
            ..Default::default()
        };
        self.repository.users.update(user_id, &changes).await
    }

    /// Create the configured administrator account if no user has its email
    pub async fn ensure_admin(&self, admin: &BootstrapAdmin) -> AppResult<User> {
        let email = normalize_email(&admin.email);
        if let Some(existing) = self.repository.users.find_by_email(&email).await? {
            if !existing.is_administrator() {
                tracing::warn!(
                    "Bootstrap administrator {} exists with role {}; leaving it unchanged",
                    email, existing.role
                );
            }
            return Ok(existing);
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                email,
                username: admin.username.clone(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: self.hash_password(&admin.password)?,
                role: Role::Administrator,
            })
            .await?;

        tracing::info!("Bootstrap administrator {} created", user.id);
        Ok(user)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
