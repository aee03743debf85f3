use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

/// Object storage for profile pictures.
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Store `bytes` and return the public url they are served from.
    async fn upload(&self, bytes: &[u8]) -> std::io::Result<String>;

    /// Delete a previously uploaded avatar. Urls this store did not issue
    /// are ignored.
    async fn delete(&self, url: &str) -> std::io::Result<()>;
}

/// Avatars stored as flat files at `{dir}/{id}`, served under `{base_url}/`.
pub struct DiskAvatarStore {
    dir: PathBuf,
    base_url: String,
}

impl DiskAvatarStore {
    pub async fn new(dir: PathBuf, base_url: impl Into<String>) -> std::io::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Avatar storage directory: {}", dir.display());
        Ok(Self {
            dir,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn file_name_for<'a>(&self, url: &'a str) -> Option<&'a str> {
        let name = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        // Only names this store generates: a bare uuid, no path segments.
        Uuid::parse_str(name).ok().map(|_| name)
    }
}

#[async_trait]
impl AvatarStore for DiskAvatarStore {
    async fn upload(&self, bytes: &[u8]) -> std::io::Result<String> {
        let name = Uuid::now_v7().to_string();
        fs::write(self.dir.join(&name), bytes).await?;
        Ok(format!("{}/{}", self.base_url, name))
    }

    async fn delete(&self, url: &str) -> std::io::Result<()> {
        let Some(name) = self.file_name_for(url) else {
            return Ok(());
        };
        match fs::remove_file(self.dir.join(name)).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
