// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User account model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum username length.
pub const USERNAME_MAX_LEN: usize = 150;

/// User account stored in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique username (also used as document ID)
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    /// When the account was created
    pub date_joined: DateTime<Utc>,
    /// Last successful login
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            date_joined: Utc::now(),
            last_login: None,
        }
    }
}

/// Usernames are letters, digits and `@ . + - _`.
///
/// Usernames double as Firestore document IDs, so `.`, `..` and the
/// reserved `__*__` form are rejected.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username != "."
        && username != ".."
        && !is_reserved_document_id(username)
        && username.chars().count() <= USERNAME_MAX_LEN
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn is_reserved_document_id(id: &str) -> bool {
    id.len() >= 4 && id.starts_with("__") && id.ends_with("__")
}
