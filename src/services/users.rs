use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::UserStore,
    error::{AppError, AppResult},
    models::{AddUserRequest, UpdateUserRequest, User, UserProfile},
};

const MIN_PASSWORD_LEN: usize = 8;

/// Hashes a password with Argon2id into a PHC string
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

fn validate_profile(email: &str, fname: &str, lname: &str) -> AppResult<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation(format!("Invalid email address: {}", email)));
    }
    if fname.trim().is_empty() || lname.trim().is_empty() {
        return Err(AppError::Validation(
            "First and last name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Registers a user; the email must not already be in use
pub async fn create_user(store: &dyn UserStore, request: AddUserRequest) -> AppResult<UserProfile> {
    validate_profile(&request.email, &request.fname, &request.lname)?;
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }

    let password = request.password;
    let hashed_password = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))??;

    let user = User {
        user_id: Uuid::new_v4().to_string(),
        email: request.email.trim().to_string(),
        hashed_password,
        fname: request.fname.trim().to_string(),
        lname: request.lname.trim().to_string(),
        updated_at: Utc::now(),
    };

    store.create_user(&user).await?;
    tracing::info!(user_id = %user.user_id, "User created");

    Ok(UserProfile::from(&user))
}

pub async fn get_user(store: &dyn UserStore, user_id: &str) -> AppResult<UserProfile> {
    store
        .get_user(user_id)
        .await?
        .map(|user| UserProfile::from(&user))
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

pub async fn update_user(
    store: &dyn UserStore,
    user_id: &str,
    request: UpdateUserRequest,
) -> AppResult<UserProfile> {
    validate_profile(&request.email, &request.fname, &request.lname)?;
    let request = UpdateUserRequest {
        email: request.email.trim().to_string(),
        fname: request.fname.trim().to_string(),
        lname: request.lname.trim().to_string(),
    };

    let user = store
        .update_user(user_id, &request, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    tracing::info!(user_id = %user_id, "User updated");
    Ok(UserProfile::from(&user))
}

/// Deletes the user together with their ratings
pub async fn delete_user(store: &dyn UserStore, user_id: &str) -> AppResult<()> {
    if !store.delete_user(user_id).await? {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }
    tracing::info!(user_id = %user_id, "User deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    fn add_request(email: &str) -> AddUserRequest {
        AddUserRequest {
            fname: "Ada".to_string(),
            lname: "Lovelace".to_string(),
            email: email.to_string(),
            password: "correct horse battery".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_hashes_password() {
        let store = MemoryStore::new();
        let profile = create_user(&store, add_request("ada@example.com")).await.unwrap();

        let stored = store.get_user(&profile.user_id).await.unwrap().unwrap();
        assert!(stored.hashed_password.starts_with("$argon2"));
        assert_ne!(stored.hashed_password, "correct horse battery");

        let parsed = PasswordHash::new(&stored.hashed_password).unwrap();
        assert!(Argon2::default()
            .verify_password(b"correct horse battery", &parsed)
            .is_ok());
    }

    #[tokio::test]
    async fn test_create_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        create_user(&store, add_request("ada@example.com")).await.unwrap();

        let err = create_user(&store, add_request(" ada@example.com "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let store = MemoryStore::new();

        let err = create_user(&store, add_request("not-an-email")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut short = add_request("ada@example.com");
        short.password = "short".to_string();
        let err = create_user(&store, short).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_update_delete() {
        let store = MemoryStore::new();
        let profile = create_user(&store, add_request("ada@example.com")).await.unwrap();

        let fetched = get_user(&store, &profile.user_id).await.unwrap();
        assert_eq!(fetched.email, "ada@example.com");

        let updated = update_user(
            &store,
            &profile.user_id,
            UpdateUserRequest {
                email: "countess@example.com".to_string(),
                fname: "Augusta".to_string(),
                lname: "King".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.email, "countess@example.com");
        assert_eq!(updated.fname, "Augusta");

        delete_user(&store, &profile.user_id).await.unwrap();
        assert!(matches!(
            get_user(&store, &profile.user_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_user(&store, &profile.user_id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
