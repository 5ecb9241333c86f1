// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store used when no GCP project is configured, and by tests.

use crate::models::{GaCredential, User};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Process-local document store. Clones share the same maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<String, User>>,
    credentials: Arc<DashMap<String, GaCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_user(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|u| u.clone())
    }

    /// Insert a user; returns false if the username is taken.
    pub fn create_user(&self, user: &User) -> bool {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                true
            }
        }
    }

    pub fn update_user(&self, user: &User) {
        self.users.insert(user.username.clone(), user.clone());
    }

    pub fn get_credential(&self, owner: &str) -> Option<GaCredential> {
        self.credentials.get(owner).map(|c| c.clone())
    }

    pub fn set_credential(&self, credential: &GaCredential) {
        self.credentials
            .insert(credential.owner.clone(), credential.clone());
    }

    /// Update token fields in place; returns false if the owner has no credential.
    pub fn update_credential_tokens(&self, credential: &GaCredential) -> bool {
        match self.credentials.get_mut(&credential.owner) {
            Some(mut stored) => {
                stored.access_token = credential.access_token.clone();
                stored.expiry = credential.expiry;
                stored.updated_at = credential.updated_at;
                true
            }
            None => false,
        }
    }

    pub fn delete_credential(&self, owner: &str) -> bool {
        self.credentials.remove(owner).is_some()
    }

    /// Number of stored credentials.
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }
}
