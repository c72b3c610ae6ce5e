//! Client seam between the FUSE adapter and a remotefs server node.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::FsError;
use crate::model::{FileInfo, LockType};

/// The operations the FUSE adapter needs from a server node.
///
/// Reads and writes are whole-file: the adapter slices reads and assembles
/// partial writes itself.
#[async_trait]
pub trait RemoteFs: Send + Sync + 'static {
    async fn info(&self, path: &str) -> Result<FileInfo, FsError>;

    async fn list(&self, path: &str) -> Result<Vec<FileInfo>, FsError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError>;

    async fn write(&self, path: &str, content: &[u8], mode: u32) -> Result<(), FsError>;

    async fn lock(&self, path: &str, lock_type: LockType, pid: u32) -> Result<(), FsError>;

    async fn unlock(&self, path: &str, pid: u32) -> Result<(), FsError>;
}

/// Deadline applied to every request against the server node.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`RemoteFs`] over the server's HTTP facade.
///
/// Writes carry this process's pid so the engine can admit writes from the
/// process that holds the write lock.
pub struct HttpRemoteFs {
    client: reqwest::Client,
    base_url: String,
    pid: u32,
}

impl HttpRemoteFs {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FsError> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FsError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            pid: std::process::id(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    /// Map a non-success response onto the engine's error taxonomy.
    async fn error_for(path: &str, response: reqwest::Response) -> FsError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => FsError::NotFound(path.to_owned()),
            StatusCode::CONFLICT => FsError::Busy,
            StatusCode::BAD_REQUEST => FsError::Malformed(body),
            _ => FsError::Transport(format!("server replied {status}: {body}")),
        }
    }
}

fn transport(e: reqwest::Error) -> FsError {
    FsError::Transport(e.to_string())
}

#[async_trait]
impl RemoteFs for HttpRemoteFs {
    async fn info(&self, path: &str) -> Result<FileInfo, FsError> {
        let response = self
            .client
            .get(self.url("info"))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }
        response.json().await.map_err(transport)
    }

    async fn list(&self, path: &str) -> Result<Vec<FileInfo>, FsError> {
        let response = self
            .client
            .get(self.url("list"))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }
        response.json().await.map_err(transport)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let response = self
            .client
            .get(self.url("read"))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }
        let info: FileInfo = response.json().await.map_err(transport)?;
        Ok(info.content.unwrap_or_default())
    }

    async fn write(&self, path: &str, content: &[u8], mode: u32) -> Result<(), FsError> {
        let body = FileInfo {
            name: path.rsplit('/').next().unwrap_or(path).to_owned(),
            size: content.len() as u64,
            mode,
            mod_time: SystemTime::now(),
            is_dir: false,
            content: Some(content.to_vec()),
        };

        let response = self
            .client
            .post(self.url("write"))
            .query(&[("path", path.to_owned()), ("pid", self.pid.to_string())])
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }
        Ok(())
    }

    async fn lock(&self, path: &str, lock_type: LockType, pid: u32) -> Result<(), FsError> {
        let response = self
            .client
            .post(self.url("lock"))
            .query(&[
                ("path", path.to_owned()),
                ("type", lock_type.as_wire().to_string()),
                ("pid", pid.to_string()),
            ])
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }
        Ok(())
    }

    async fn unlock(&self, path: &str, pid: u32) -> Result<(), FsError> {
        let response = self
            .client
            .post(self.url("unlock"))
            .query(&[("path", path.to_owned()), ("pid", pid.to_string())])
            .send()
            .await
            .map_err(transport)?;
        // A lock conflict on unlock means the record is gone or owned
        // elsewhere; surface it distinctly so callers can skip it.
        if response.status() == StatusCode::CONFLICT {
            return Err(FsError::NotLocked);
        }
        if !response.status().is_success() {
            return Err(Self::error_for(path, response).await);
        }
        Ok(())
    }
}
