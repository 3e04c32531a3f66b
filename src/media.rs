// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Image host client for property and profile images.
//!
//! Uploads land in a per-owner folder under `MEDIA_FOLDER`. The server only
//! ever deletes images inside the owner's folder, so a client-supplied
//! public id naming someone else's image is left alone.
//!
//! Deletion is always best-effort: callers spawn it after the store write
//! has committed and only log failures.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MEDIA_CLOUD_NAME` | Account (cloud) name | Media disabled when unset |
//! | `MEDIA_API_KEY` | API key | Media disabled when unset |
//! | `MEDIA_API_SECRET` | API secret used to sign requests | Media disabled when unset |
//! | `MEDIA_API_BASE` | API base URL | `https://api.cloudinary.com/v1_1` |
//! | `MEDIA_FOLDER` | Root folder for uploads | `realty` |

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::auth::directory::normalize_email;
use crate::config::ConfigError;
use crate::storage::PropertyImage;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DEFAULT_FOLDER: &str = "realty";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image host rejected deletion of {public_id}: {result}")]
    Rejected { public_id: String, result: String },

    #[error("image host stored the upload outside {folder}")]
    Misplaced { folder: String },
}

/// Image host credentials.
#[derive(Clone)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    /// Root folder; each owner gets a subfolder below it
    pub folder: String,
}

impl std::fmt::Debug for MediaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[redacted]")
            .field("api_base", &self.api_base)
            .field("folder", &self.folder)
            .finish()
    }
}

impl MediaConfig {
    pub fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
            get("MEDIA_CLOUD_NAME"),
            get("MEDIA_API_KEY"),
            get("MEDIA_API_SECRET"),
        ) else {
            return Ok(None);
        };

        let api_base = get("MEDIA_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        url::Url::parse(&api_base).map_err(|_| ConfigError::Invalid {
            name: "MEDIA_API_BASE",
            value: api_base.clone(),
        })?;

        let folder = get("MEDIA_FOLDER").unwrap_or_else(|| DEFAULT_FOLDER.to_string());
        let folder = folder.trim_matches('/').to_string();
        if folder.is_empty() {
            return Err(ConfigError::Invalid {
                name: "MEDIA_FOLDER",
                value: folder,
            });
        }

        Ok(Some(Self {
            cloud_name,
            api_key,
            api_secret,
            api_base: api_base.trim_end_matches('/').to_string(),
            folder,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

/// Folder holding every image uploaded on behalf of `owner_email`.
///
/// The subfolder is a digest of the normalized email so addresses never
/// appear in public image URLs.
pub fn owner_folder(root: &str, owner_email: &str) -> String {
    let digest = Sha256::digest(normalize_email(owner_email).as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{root}/{hex}")
}

/// Keep only the refs stored in the owner's folder.
///
/// Records with no owner have nothing attributable.
pub fn attributable_refs(root: &str, owner_email: Option<&str>, refs: Vec<String>) -> Vec<String> {
    let Some(owner_email) = owner_email else {
        if !refs.is_empty() {
            tracing::warn!(count = refs.len(), "skipping cleanup of images on an ownerless record");
        }
        return Vec::new();
    };

    let prefix = format!("{}/", owner_folder(root, owner_email));
    refs.into_iter()
        .filter(|public_id| {
            let owned = public_id.starts_with(&prefix) && !public_id.contains("..");
            if !owned {
                tracing::warn!(public_id = %public_id, "skipping cleanup of image outside the owner's folder");
            }
            owned
        })
        .collect()
}

/// Client for the image host's signed admin API.
#[derive(Clone)]
pub struct MediaClient {
    config: MediaConfig,
    client: reqwest::Client,
}

impl MediaClient {
    pub fn new(config: MediaConfig) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn folder(&self) -> &str {
        &self.config.folder
    }

    /// Upload one image into the owner's folder.
    pub async fn upload_image(
        &self,
        owner_email: &str,
        file_name: String,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<PropertyImage, MediaError> {
        let folder = owner_folder(&self.config.folder, owner_email);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", folder.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let file = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("folder", folder.clone())
            .text("timestamp", timestamp)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!(
            "{}/{}/image/upload",
            self.config.api_base, self.config.cloud_name
        );
        let response: UploadResponse = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.public_id.starts_with(&format!("{folder}/")) {
            return Err(MediaError::Misplaced { folder });
        }

        Ok(PropertyImage {
            url: response.secure_url,
            public_id: Some(response.public_id),
        })
    }

    /// Delete one hosted image by its public id.
    ///
    /// An image the host no longer knows about counts as deleted.
    pub async fn delete_image(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", public_id), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let url = format!(
            "{}/{}/image/destroy",
            self.config.api_base, self.config.cloud_name
        );
        let response: DestroyResponse = self
            .client
            .post(url)
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(MediaError::Rejected {
                public_id: public_id.to_string(),
                result: other.to_string(),
            }),
        }
    }
}

/// Spawn best-effort deletion of the owner's hosted images. Refs outside
/// the owner's folder are skipped. Failures are logged only.
pub fn spawn_cleanup(
    media: Option<Arc<MediaClient>>,
    owner_email: Option<&str>,
    public_ids: Vec<String>,
) {
    let Some(media) = media else {
        if !public_ids.is_empty() {
            tracing::debug!(count = public_ids.len(), "image host not configured, skipping cleanup");
        }
        return;
    };
    let public_ids = attributable_refs(media.folder(), owner_email, public_ids);
    if public_ids.is_empty() {
        return;
    }

    tokio::spawn(async move {
        for public_id in public_ids {
            if let Err(e) = media.delete_image(&public_id).await {
                tracing::warn!(public_id = %public_id, error = %e, "failed to delete hosted image");
            }
        }
    });
}

/// Sign request parameters: sorted `key=value` pairs joined by `&`, followed
/// by the secret, hashed with SHA-256 and hex encoded.
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{joined}{secret}").as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
