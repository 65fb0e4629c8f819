//! Server lifecycle: listen, accept, one task per channel.
//!
//! ```ignore
//! use streamfn::map;
//!
//! #[tokio::main]
//! async fn main() -> streamfn::Result<()> {
//!     map::server(|_keys, datum: streamfn::Datum| async move {
//!         Ok(vec![streamfn::Message::new(datum.value)])
//!     })
//!     .start()
//!     .await
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::responder::Responder;
use crate::server_info::ServerInfo;
use crate::session::Channel;
use crate::shape::Shape;
use crate::transport::SocketListener;
use crate::writer::spawn_writer_task;

/// A startable service for one user function.
///
/// Built by the `server` function of a service module, e.g. [`crate::map::server`].
pub struct Server {
    shape: Arc<Shape>,
    config: ServerConfig,
    info: ServerInfo,
}

impl Server {
    pub(crate) fn new(shape: Shape, config: ServerConfig, info: ServerInfo) -> Self {
        let info = info.with_methods(&shape.methods());
        Self {
            shape: Arc::new(shape),
            config,
            info,
        }
    }

    /// Listen on `path` instead of the service's default socket.
    pub fn with_socket_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Write server info to `path` instead of the service's default location.
    pub fn with_server_info_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.server_info_path = path.into();
        self
    }

    /// Largest message accepted or written; at least 512 bytes.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.config = self.config.with_max_message_size(max_message_size);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_channel_capacity(capacity);
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn socket_file(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn server_info_file(&self) -> &Path {
        &self.config.server_info_path
    }

    /// What the server advertises in its server-info file.
    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    #[cfg(test)]
    pub(crate) fn shape(&self) -> Arc<Shape> {
        Arc::clone(&self.shape)
    }

    /// Run until Ctrl-C.
    pub async fn start(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl-C, shutting down"),
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, shutting down"),
            }
            let _ = tx.send(());
        });
        self.start_with_shutdown(rx).await
    }

    /// Run until `shutdown` fires (or its sender is dropped).
    ///
    /// Channels still open at shutdown are aborted. The socket file is
    /// removed before this returns.
    pub async fn start_with_shutdown(self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        let listener = SocketListener::bind(&self.config.socket_path)?;
        self.info.write(&self.config.server_info_path).await?;
        info!(socket = %listener.path().display(), "server listening");

        let mut channels = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        let shape = Arc::clone(&self.shape);
                        let config = self.config.clone();
                        channels.spawn(serve_connection(stream, shape, config));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(joined) = channels.join_next(), if !channels.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "channel task failed");
                    }
                }
            }
        }

        info!(open_channels = channels.len(), "server stopping");
        channels.shutdown().await;
        drop(listener);
        Ok(())
    }
}

/// Serve one connection as one channel.
///
/// A fatal error is reported to the engine with an error frame before the
/// channel is closed.
pub(crate) async fn serve_connection<S>(stream: S, shape: Arc<Shape>, config: ServerConfig)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (writer, writer_task) = spawn_writer_task(write_half, config.writer_config());
    let mut channel = Channel::new(
        Box::new(read_half),
        Responder::new(0, writer),
        config.max_message_size,
        config.channel_capacity,
    );

    if let Err(e) = shape.serve(&mut channel).await {
        error!(
            method_id = channel.responder().method_id(),
            error = %e,
            "channel failed"
        );
        let report = channel
            .responder()
            .error(channel.last_request_id(), &e.to_string())
            .await;
        if let Err(send_err) = report {
            debug!(error = %send_err, "could not report channel error");
        }
    }

    drop(channel);
    match writer_task.await {
        Ok(Ok(())) => debug!("channel closed"),
        Ok(Err(e)) => debug!(error = %e, "channel writer stopped"),
        Err(e) => warn!(error = %e, "channel writer task failed"),
    }
}
