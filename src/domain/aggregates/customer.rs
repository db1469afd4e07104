//! Customers and their shipping address

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Registered shop user. Serializes to the public profile only.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture_url: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub is_staff: bool,
    #[serde(skip)]
    pub is_active: bool,
    #[serde(skip)]
    pub date_joined: DateTime<Utc>,
}

/// Emails are stored and matched in this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerAddress {
    pub id: i64,
    pub customer: User,
    pub street: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
}

/// Address fields as submitted by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressFields {
    pub street: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
}

impl AddressFields {
    pub const MAX_LINE: usize = 50;
    pub const MAX_PHONE: usize = 13;

    /// Returns the first `(field, message)` violating a column limit.
    pub fn check_lengths(&self) -> Option<(&'static str, String)> {
        let lines = [("street", &self.street, Self::MAX_LINE), ("state", &self.state, Self::MAX_LINE), ("city", &self.city, Self::MAX_LINE), ("phone", &self.phone, Self::MAX_PHONE)];
        lines.into_iter().find_map(|(name, value, max)| {
            value.as_ref().filter(|v| v.chars().count() > max)
                .map(|_| (name, format!("Ensure this field has no more than {max} characters.")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_length_limits() {
        let ok = AddressFields { street: Some("123 Main St".into()), phone: Some("1234567890".into()), ..Default::default() };
        assert_eq!(ok.check_lengths(), None);
        let long_phone = AddressFields { phone: Some("12345678901234".into()), ..Default::default() };
        assert_eq!(long_phone.check_lengths().map(|(f, _)| f), Some("phone"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Mixed.Case@Example.COM "), "mixed.case@example.com");
    }

    #[test]
    fn test_user_serializes_public_fields_only() {
        let user = User {
            id: 7, email: "a@b.com".into(), username: "a".into(), first_name: String::new(), last_name: String::new(),
            profile_picture_url: None, password_hash: "$argon2id$secret".into(), is_staff: true, is_active: true, date_joined: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "a@b.com");
        assert!(json.get("password_hash").is_none());
        assert!(json.get("is_staff").is_none());
    }
}
