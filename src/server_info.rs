//! Server-info side-channel file.
//!
//! Written before the socket accepts connections. The engine reads it to
//! learn the protocol, the minimum engine version this server needs, and the
//! method table. The JSON document is followed by [`END_MARKER`] so a reader
//! can tell a complete file from one still being written.
//!
//! ```
//! use streamfn::server_info::{parse, ServerInfo, END_MARKER};
//!
//! let info = ServerInfo::new("1.4.0-z");
//! let text = info.render().unwrap();
//! assert!(text.ends_with(END_MARKER));
//! assert_eq!(parse(&text).unwrap(), info);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::session::Cardinality;
use crate::shape::Method;

/// Literal appended after the JSON document.
pub const END_MARKER: &str = "U+005C__END__";

/// Protocol name for Unix domain sockets.
pub const PROTOCOL_UDS: &str = "uds";

/// Metadata key announcing the map flavor.
pub const MAP_MODE_KEY: &str = "MAP_MODE";

/// Minimum engine version for most services.
pub const MINIMUM_NUMAFLOW_VERSION: &str = "1.4.0-z";

/// Minimum engine version for the accumulator.
pub const MINIMUM_NUMAFLOW_VERSION_ACCUMULATOR: &str = "1.5.0-z";

/// Entry of the advertised method table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub id: u16,
    /// `"unary"` or `"streaming"`.
    pub response: String,
}

/// Contents of the server-info file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub protocol: String,
    pub language: String,
    pub minimum_numaflow_version: String,
    pub version: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub methods: BTreeMap<String, MethodInfo>,
}

impl ServerInfo {
    pub fn new(minimum_numaflow_version: &str) -> Self {
        Self {
            protocol: PROTOCOL_UDS.to_string(),
            language: "rust".to_string(),
            minimum_numaflow_version: minimum_numaflow_version.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            metadata: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_methods(mut self, methods: &[Method]) -> Self {
        for method in methods {
            let response = match method.cardinality {
                Cardinality::Unary => "unary",
                Cardinality::Streaming => "streaming",
            };
            self.methods.insert(
                method.name.to_string(),
                MethodInfo {
                    id: method.id,
                    response: response.to_string(),
                },
            );
        }
        self
    }

    /// JSON document followed by the end marker.
    pub fn render(&self) -> Result<String> {
        let mut text = serde_json::to_string(self)?;
        text.push_str(END_MARKER);
        Ok(text)
    }

    /// Write the file, creating parent directories as needed.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.render()?).await?;
        info!(path = %path.display(), "server info written");
        Ok(())
    }
}

/// Parse a complete server-info file.
pub fn parse(text: &str) -> Result<ServerInfo> {
    let json = text
        .strip_suffix(END_MARKER)
        .ok_or_else(|| Error::Protocol("server info is missing the end marker".to_string()))?;
    Ok(serde_json::from_str(json)?)
}

/// Read and parse a server-info file.
pub async fn read(path: &Path) -> Result<ServerInfo> {
    let text = tokio::fs::read_to_string(path).await?;
    parse(&text)
}
