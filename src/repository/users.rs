//! Users repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::user::{NewUser, User, UserChanges},
};

use super::UserStore;

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, role, is_active, \
                            password_hash, created_at, updated_at";

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UsersRepository {
    async fn get(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, first_name, last_name, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<User> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = NOW()");
        if let Some(ref username) = changes.username {
            qb.push(", username = ").push_bind(username.clone());
        }
        if let Some(ref first_name) = changes.first_name {
            qb.push(", first_name = ").push_bind(first_name.clone());
        }
        if let Some(ref last_name) = changes.last_name {
            qb.push(", last_name = ").push_bind(last_name.clone());
        }
        if let Some(role) = changes.role {
            qb.push(", role = ").push_bind(role);
        }
        if let Some(is_active) = changes.is_active {
            qb.push(", is_active = ").push_bind(is_active);
        }
        if let Some(ref password_hash) = changes.password_hash {
            qb.push(", password_hash = ").push_bind(password_hash.clone());
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", USER_COLUMNS));

        qb.build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }
}
