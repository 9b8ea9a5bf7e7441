//! Runtime configuration, read from a JSON file.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "memory": { "initial_pages": 1, "max_pages": 16, "trap_policy": "abort" },
//!   "names": { "max_function_names": 1048576 },
//!   "utf8": "swar"
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::parser::names::{NameDecoder, NameParserLimits};
use crate::runtime::MemoryConfig;
use crate::utf8::{self, Strategy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub memory: MemoryConfig,
    pub names: NameParserLimits,
    /// Forces a UTF-8 validation tier. `None` uses the one detected at startup.
    pub utf8: Option<Strategy>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Json { path: display, source })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn strategy(&self) -> Strategy {
        self.utf8.unwrap_or_else(utf8::detected)
    }

    pub fn name_decoder(&self) -> NameDecoder {
        NameDecoder::new(self.names).with_strategy(self.strategy())
    }
}
