// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth client secrets file.
//!
//! Accepts the JSON downloaded from the Google Cloud Console (`web` or
//! `installed` section) or a flat `{"client_id", "client_secret"}` object.

use serde::Deserialize;
use std::path::Path;

/// OAuth application credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    web: Option<Section>,
    installed: Option<Section>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Section {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientSecretsError {
    #[error("failed to read client secrets file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse client secrets JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("client secrets JSON has no client_id/client_secret")]
    MissingFields,
}

impl ClientSecrets {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientSecretsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ClientSecretsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ClientSecretsError> {
        let file: SecretsFile = serde_json::from_str(json)?;

        if let Some(section) = file.web.or(file.installed) {
            return Ok(Self::new(section.client_id, section.client_secret));
        }

        match (file.client_id, file.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Self::new(client_id, client_secret)),
            _ => Err(ClientSecretsError::MissingFields),
        }
    }
}
