use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use mongodb::bson::oid::ObjectId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

lazy_static! {
    static ref UZ_PHONE: Regex = Regex::new(r"^\+998\d{9}$").unwrap();
}

/// User model stored in MongoDB "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    pub role: UserRole,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "lastLoginAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Per-user profile, one document per user in "profiles"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    #[serde(default)]
    pub bio: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn empty_for(user_id: ObjectId) -> Self {
        Self {
            id: ObjectId::new(),
            user_id,
            bio: String::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }
}

/// Authenticated identity taken from a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: ObjectId,
    pub role: UserRole,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// User profile returned to client (without sensitive data)
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id.to_hex(),
            full_name: user.full_name(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            birth_date: user.birth_date,
            role: user.role,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Compact view of a user embedded in other responses (instructor, student rows).
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub full_name: String,
    pub role: UserRole,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id.to_hex(),
            full_name: user.full_name(),
            role: user.role,
        }
    }
}

/// Request to register a new user
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 30, message = "First name must be 1-30 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 30, message = "Last name must be 1-30 characters"))]
    pub last_name: String,

    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,

    /// Only student and teacher accounts can be self-registered.
    #[serde(default)]
    #[validate(custom(function = "validate_registration_role"))]
    pub role: UserRole,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password1: String,

    #[validate(must_match(other = "password1", message = "Passwords do not match"))]
    pub password2: String,

    #[serde(default)]
    #[validate(custom(function = "validate_terms_accepted"))]
    pub terms_accepted: bool,
}

/// Request to login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Response after successful login or registration
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 30, message = "First name must be 1-30 characters"))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 30, message = "Last name must be 1-30 characters"))]
    pub last_name: Option<String>,

    /// An empty string clears the stored phone number.
    #[validate(custom(function = "validate_optional_phone"))]
    pub phone: Option<String>,

    pub birth_date: Option<NaiveDate>,

    #[validate(length(max = 2000, message = "Bio must be at most 2000 characters"))]
    pub bio: Option<String>,
}

/// Request to change password
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub old_password: String,

    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password1: String,

    #[validate(must_match(other = "new_password1", message = "Passwords do not match"))]
    pub new_password2: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
    pub bio: String,
    pub profile_created_at: DateTime<Utc>,
}

/// Normalises a phone number to `+998XXXXXXXXX`.
///
/// Everything except digits and `+` is dropped; a bare `998` prefix gets its
/// leading `+` added back.
pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let mut phone: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if !phone.starts_with("+998") {
        if phone.starts_with("998") {
            phone.insert(0, '+');
        } else {
            return Err(phone_error("phone_prefix", "Phone number must start with +998"));
        }
    }

    if phone.len() != 13 {
        return Err(phone_error(
            "phone_format",
            "Phone number must look like +998XXXXXXXXX",
        ));
    }

    if !UZ_PHONE.is_match(&phone) {
        return Err(phone_error("phone_digits", "Phone number may contain digits only"));
    }

    Ok(phone)
}

fn phone_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() {
        return Ok(());
    }
    normalize_phone(phone).map(|_| ())
}

fn validate_optional_phone(phone: &str) -> Result<(), ValidationError> {
    validate_phone(phone)
}

fn validate_registration_role(role: &UserRole) -> Result<(), ValidationError> {
    match role {
        UserRole::Student | UserRole::Teacher => Ok(()),
        UserRole::Admin => {
            let mut error = ValidationError::new("role");
            error.message = Some(Cow::Borrowed("Choose student or teacher"));
            Err(error)
        }
    }
}

fn validate_terms_accepted(accepted: &bool) -> Result<(), ValidationError> {
    if *accepted {
        Ok(())
    } else {
        let mut error = ValidationError::new("terms");
        error.message = Some(Cow::Borrowed("You must accept the terms of service"));
        Err(error)
    }
}
