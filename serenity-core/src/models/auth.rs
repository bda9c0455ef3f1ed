use serde::{Deserialize, Serialize};

use crate::backend::BackendError;

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleLoginRequest {
    pub token: String,
}

/// Successful auth reply. Signup only carries `message`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn require(field: &str, value: &str) -> Result<(), BackendError> {
    if value.trim().is_empty() {
        return Err(BackendError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_email(email: &str) -> Result<(), BackendError> {
    require("email", email)?;
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(BackendError::Validation(format!("invalid email address: {email}"))),
    }
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), BackendError> {
        require("full name", &self.full_name)?;
        require_email(&self.email)?;
        require("password", &self.password)
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), BackendError> {
        require_email(&self.email)?;
        require("password", &self.password)
    }
}

impl GoogleLoginRequest {
    pub fn validate(&self) -> Result<(), BackendError> {
        require("token", &self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_validation() {
        let ok = SignupRequest {
            full_name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "pw".into(),
        };
        assert!(ok.validate().is_ok());

        let blank_name = SignupRequest {
            full_name: "  ".into(),
            ..ok.clone()
        };
        assert!(matches!(blank_name.validate(), Err(BackendError::Validation(_))));
    }

    #[test]
    fn test_login_rejects_malformed_email() {
        for email in ["", "ada", "@example.com", "ada@"] {
            let req = LoginRequest {
                email: email.into(),
                password: "pw".into(),
            };
            assert!(
                matches!(req.validate(), Err(BackendError::Validation(_))),
                "email {email:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_google_login_requires_token() {
        let req = GoogleLoginRequest { token: String::new() };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_auth_response_tolerates_missing_fields() {
        let r: AuthResponse =
            serde_json::from_str(r#"{"message": "User created successfully", "user_id": 4}"#)
                .unwrap();
        assert_eq!(r.user, None);
        assert_eq!(r.message.as_deref(), Some("User created successfully"));
    }
}
