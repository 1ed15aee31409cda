/**
 * Authentication Handler Types
 *
 * Request bodies validate themselves before any database access.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::auth::users::User;
use crate::shared::SharedError;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize, Serialize, Debug)]
pub struct SignupRequest {
    /// 3-30 chars, starts with a letter, alphanumeric + underscore
    pub username: String,
    pub email: String,
    /// Hashed before storage
    pub password: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), SharedError> {
        if !is_valid_username(&self.username) {
            return Err(SharedError::validation(
                "username",
                "must be 3-30 chars, start with a letter, and contain only letters, numbers, and underscores",
            ));
        }
        if !self.email.contains('@') {
            return Err(SharedError::validation("email", "invalid email format"));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(SharedError::validation(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }
        Ok(())
    }
}

/// Login by username or email
#[derive(Deserialize, Serialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    /// Bearer token, valid for 30 days
    pub token: String,
    pub user: UserResponse,
}

/// User information safe to return to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

fn is_valid_username(username: &str) -> bool {
    if username.len() < 3 || username.len() > 30 {
        return false;
    }

    let mut chars = username.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn username_rules() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("a_1b"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("1alice"));
        assert!(!is_valid_username("ali ce"));
        assert!(!is_valid_username(&"a".repeat(31)));
    }

    #[test]
    fn signup_validation_names_the_field() {
        assert!(request("alice", "alice@example.com", "password1").validate().is_ok());

        let err = request("alice", "alice.example.com", "password1").validate().unwrap_err();
        assert!(matches!(err, SharedError::ValidationError { ref field, .. } if field == "email"));

        let err = request("alice", "alice@example.com", "short").validate().unwrap_err();
        assert!(matches!(err, SharedError::ValidationError { ref field, .. } if field == "password"));
    }
}
