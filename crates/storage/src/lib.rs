use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

const NAME_TIMESTAMP_FORMAT: &str = "%d_%m_%y_%H_%M_%S";
const NAME_ATTEMPTS: usize = 8;
const STAGING_PREFIX: &str = ".";
const STAGING_SUFFIX: &str = ".part";

/// Spool directory holding accepted images until they are published.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub original_name: String,
    pub stored_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Text after the last `.` of `filename`, if there is one.
pub fn extension_of(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

pub fn is_allowed_image(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// `png, jpg, jpeg, gif`
pub fn allowed_formats_label() -> String {
    ALLOWED_EXTENSIONS.join(", ")
}

/// Name an upload is stored under: `dd_mm_yy_HH_MM_SS_NNNN.ext`.
pub fn generated_name(original_name: &str, at: NaiveDateTime, code: u16) -> String {
    let ext = extension_of(original_name)
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    format!(
        "{}_{:04}{ext}",
        at.format(NAME_TIMESTAMP_FORMAT),
        code % 10_000
    )
}

fn is_staging(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

async fn discard(staging: &Path) {
    match fs::remove_file(staging).await {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => warn!(%error, path = %staging.display(), "failed to remove staging file"),
    }
}

fn random_code() -> u16 {
    (Uuid::new_v4().as_u128() % 10_000) as u16
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredImage> {
        self.save_with(original_name, bytes, Local::now().naive_local(), random_code)
            .await
    }

    /// Writes `bytes` to a hidden staging file, then links it under a free
    /// generated name. The generated name only ever appears with its full
    /// contents, and the staging file is gone when this returns.
    async fn save_with(
        &self,
        original_name: &str,
        bytes: &[u8],
        at: NaiveDateTime,
        mut next_code: impl FnMut() -> u16,
    ) -> Result<StoredImage> {
        fs::create_dir_all(&self.root).await.with_context(|| {
            format!("failed to create upload directory '{}'", self.root.display())
        })?;

        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}{STAGING_SUFFIX}", Uuid::new_v4().simple()));
        let linked = self
            .write_and_link(&staging, original_name, bytes, at, &mut next_code)
            .await;
        discard(&staging).await;
        let (stored_name, path) = linked?;

        info!(original_name, %stored_name, size_bytes = bytes.len(), "image stored");
        Ok(StoredImage {
            original_name: original_name.to_string(),
            stored_name,
            path,
            size_bytes: bytes.len() as u64,
        })
    }

    async fn write_and_link(
        &self,
        staging: &Path,
        original_name: &str,
        bytes: &[u8],
        at: NaiveDateTime,
        next_code: &mut impl FnMut() -> u16,
    ) -> Result<(String, PathBuf)> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(staging)
            .await
            .with_context(|| format!("failed to create '{}'", staging.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("failed to write '{}'", staging.display()))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        for _ in 0..NAME_ATTEMPTS {
            let stored_name = generated_name(original_name, at, next_code());
            let path = self.root.join(&stored_name);
            match fs::hard_link(staging, &path).await {
                Ok(()) => return Ok((stored_name, path)),
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    debug!(%stored_name, "generated name taken; drawing a new code");
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("failed to link '{}'", path.display()))
                }
            }
        }

        bail!("no free name for '{original_name}' after {NAME_ATTEMPTS} attempts")
    }

    /// Files waiting in the spool, sorted by name. Uploads still being
    /// written are not listed. `None` when the spool directory does not
    /// exist at all.
    pub async fn list_pending(&self) -> Result<Option<Vec<PendingImage>>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to read upload directory '{}'", self.root.display())
                })
            }
        };

        let mut pending = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !metadata.is_file() || is_staging(&name) {
                continue;
            }
            pending.push(PendingImage {
                name,
                path: entry.path(),
                size_bytes: metadata.len(),
            });
        }
        pending.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Some(pending))
    }

    pub async fn load(&self, image: &PendingImage) -> Result<Vec<u8>> {
        fs::read(&image.path)
            .await
            .with_context(|| format!("failed to read '{}'", image.path.display()))
    }

    /// Deletes one spooled file; a file that is already gone is not an error.
    pub async fn remove(&self, image: &PendingImage) -> Result<()> {
        match fs::remove_file(&image.path).await {
            Ok(()) => {
                debug!(name = %image.name, "spooled image removed");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("failed to remove '{}'", image.path.display()))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
