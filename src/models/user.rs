use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored user record, including the password hash
#[derive(Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub hashed_password: String,
    pub fname: String,
    pub lname: String,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("hashed_password", &"<redacted>")
            .field("fname", &self.fname)
            .field("lname", &self.lname)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// User as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub fname: String,
    pub lname: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            fname: user.fname.clone(),
            lname: user.lname.clone(),
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub fname: String,
    pub lname: String,
}
