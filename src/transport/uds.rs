//! Unix domain socket listener that owns its socket file.
//!
//! A stale socket left by a previous run is removed before binding, and the
//! file is removed again when the listener is dropped.

use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

use crate::error::Result;

/// Listening socket bound to a filesystem path.
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
}

impl SocketListener {
    /// Bind to `path`, creating its parent directory and replacing a stale socket.
    pub fn bind(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            debug!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept one connection; each connection is one channel.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.sock");
        std::fs::write(&path, b"stale").unwrap();

        let listener = SocketListener::bind(&path).unwrap();
        assert_eq!(listener.path(), path);

        let client = tokio::spawn({
            let path = path.clone();
            async move { UnixStream::connect(&path).await }
        });
        listener.accept().await.unwrap();
        client.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_drop_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/sink.sock");

        let listener = SocketListener::bind(&path).unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }
}
