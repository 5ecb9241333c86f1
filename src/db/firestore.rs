// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database client with typed operations.
//!
//! Provides high-level operations for:
//! - Users (accounts and password hashes)
//! - GA credentials (one OAuth token set per user)
//!
//! Backed by Firestore in production, or by [`MemoryStore`] when no GCP
//! project is configured.

use crate::db::collections;
use crate::db::MemoryStore;
use crate::error::AppError;
use crate::models::{GaCredential, User};

/// Database client.
#[derive(Clone)]
pub struct Db {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(MemoryStore),
}

impl Db {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a database backed by process memory.
    ///
    /// Data is lost on restart; used for local development and tests.
    pub fn new_in_memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    /// Wrap an existing memory store (tests keep a handle to inspect it).
    pub fn from_memory(store: MemoryStore) -> Self {
        Self {
            backend: Backend::Memory(store),
        }
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by username.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::USERS)
                .obj()
                .one(username)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => Ok(store.get_user(username)),
        }
    }

    /// Create a user. Returns `false` if the username is already taken.
    pub async fn create_user(&self, user: &User) -> Result<bool, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let inserted: Result<User, _> = client
                    .fluent()
                    .insert()
                    .into(collections::USERS)
                    .document_id(&user.username)
                    .object(user)
                    .execute()
                    .await;

                match inserted {
                    Ok(_) => Ok(true),
                    Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(false),
                    Err(e) => Err(AppError::Database(e.to_string())),
                }
            }
            Backend::Memory(store) => Ok(store.create_user(user)),
        }
    }

    /// Overwrite an existing user.
    pub async fn update_user(&self, user: &User) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::USERS)
                    .document_id(&user.username)
                    .object(user)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.update_user(user);
                Ok(())
            }
        }
    }

    // ─── Credential Operations ───────────────────────────────────

    /// Get the stored GA credential for a user.
    pub async fn get_credential(&self, owner: &str) -> Result<Option<GaCredential>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::GA_CREDENTIALS)
                .obj()
                .one(owner)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => Ok(store.get_credential(owner)),
        }
    }

    /// Create or overwrite the GA credential for `credential.owner`.
    pub async fn set_credential(&self, credential: &GaCredential) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::GA_CREDENTIALS)
                    .document_id(&credential.owner)
                    .object(credential)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.set_credential(credential);
                Ok(())
            }
        }
    }

    /// Write only the token fields of an existing credential.
    ///
    /// Leaves the property selection untouched and never recreates a
    /// credential deleted since it was read. Returns `false` if none exists.
    pub async fn update_credential_tokens(
        &self,
        credential: &GaCredential,
    ) -> Result<bool, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let updated: Result<GaCredential, _> = client
                    .fluent()
                    .update()
                    .fields(["access_token", "expiry", "updated_at"])
                    .in_col(collections::GA_CREDENTIALS)
                    .precondition(firestore::FirestoreWritePrecondition::Exists(true))
                    .document_id(&credential.owner)
                    .object(credential)
                    .execute()
                    .await;

                match updated {
                    Ok(_) => Ok(true),
                    Err(firestore::errors::FirestoreError::DataNotFoundError(_)) => Ok(false),
                    Err(e) => Err(AppError::Database(e.to_string())),
                }
            }
            Backend::Memory(store) => Ok(store.update_credential_tokens(credential)),
        }
    }

    /// Delete a user's GA credential. Returns `false` if none existed.
    pub async fn delete_credential(&self, owner: &str) -> Result<bool, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                if self.get_credential(owner).await?.is_none() {
                    return Ok(false);
                }

                client
                    .fluent()
                    .delete()
                    .from(collections::GA_CREDENTIALS)
                    .document_id(owner)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(true)
            }
            Backend::Memory(store) => Ok(store.delete_credential(owner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn credential(owner: &str, access_token: &str) -> GaCredential {
        let now = Utc::now();
        GaCredential {
            owner: owner.to_string(),
            access_token: access_token.to_string(),
            refresh_token: "refresh".to_string(),
            token_endpoint: crate::config::GOOGLE_TOKEN_URL.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            granted_scopes: vec![],
            expiry: None,
            selected_property_id: None,
            selected_property_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate() {
        let db = Db::new_in_memory();
        let user = User::new("alice", "hash");

        assert!(db.create_user(&user).await.unwrap());
        assert!(!db.create_user(&user).await.unwrap());
        assert_eq!(
            db.get_user("alice").await.unwrap().unwrap().password_hash,
            "hash"
        );
    }

    #[tokio::test]
    async fn test_credential_is_unique_per_owner() {
        let store = MemoryStore::new();
        let db = Db::from_memory(store.clone());

        db.set_credential(&credential("alice", "first")).await.unwrap();
        db.set_credential(&credential("alice", "second")).await.unwrap();

        assert_eq!(store.credential_count(), 1);
        let stored = db.get_credential("alice").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "second");
    }

    #[tokio::test]
    async fn test_delete_credential_reports_presence() {
        let db = Db::new_in_memory();
        db.set_credential(&credential("alice", "token")).await.unwrap();

        assert!(db.delete_credential("alice").await.unwrap());
        assert!(!db.delete_credential("alice").await.unwrap());
        assert!(db.get_credential("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_update_keeps_property_selection() {
        let db = Db::new_in_memory();
        let stale = credential("alice", "old");
        db.set_credential(&stale).await.unwrap();

        let mut selected = stale.clone();
        selected.selected_property_id = Some("properties/1".to_string());
        selected.selected_property_name = Some("Site".to_string());
        db.set_credential(&selected).await.unwrap();

        let mut refreshed = stale;
        refreshed.access_token = "new".to_string();
        assert!(db.update_credential_tokens(&refreshed).await.unwrap());

        let stored = db.get_credential("alice").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "new");
        assert_eq!(stored.selected_property_id.as_deref(), Some("properties/1"));
        assert_eq!(stored.selected_property_name.as_deref(), Some("Site"));
    }

    #[tokio::test]
    async fn test_token_update_does_not_recreate_deleted_credential() {
        let db = Db::new_in_memory();
        let stale = credential("alice", "old");
        db.set_credential(&stale).await.unwrap();
        db.delete_credential("alice").await.unwrap();

        assert!(!db.update_credential_tokens(&stale).await.unwrap());
        assert!(db.get_credential("alice").await.unwrap().is_none());
    }
}
