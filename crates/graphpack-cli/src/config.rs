// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Conversion settings: defaults, an optional JSON file, then flags.

use std::fs;
use std::path::{Path, PathBuf};

use graphpack_core::ScanMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::ConvertArgs;

/// Error type for loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`ConvertConfig`].
    #[error("invalid config {path}: {source}")]
    Serde {
        /// Config file path.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },
    /// A setting is out of range.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Every parameter of a conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Number of output partitions.
    pub partitions: usize,
    /// Directory holding the meta and data files.
    pub input_dir: PathBuf,
    /// Prefix of every output name.
    pub output_prefix: String,
    /// Meta file name inside `input_dir`.
    pub meta_file: String,
    /// Data file name inside `input_dir`.
    pub data_file: String,
    /// WebHDFS name node address; empty selects local files.
    pub hdfs_endpoint: String,
    /// `user.name` for WebHDFS requests; empty sends none.
    pub hdfs_user: String,
    /// Quote-aware block splitting.
    pub quote_aware: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            input_dir: PathBuf::from("./"),
            output_prefix: String::new(),
            meta_file: "meta.txt".to_owned(),
            data_file: "test.txt".to_owned(),
            hdfs_endpoint: String::new(),
            hdfs_user: String::new(),
            quote_aware: false,
        }
    }
}

impl ConvertConfig {
    /// Loads settings from a JSON file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Serde {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves the effective settings for `args`: file (if any), then flags.
    pub(crate) fn resolve(args: &ConvertArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    /// Overrides settings with every flag that was given.
    pub(crate) fn apply(&mut self, args: &ConvertArgs) {
        if let Some(partitions) = args.partitions {
            self.partitions = partitions;
        }
        if let Some(dir) = &args.input_dir {
            self.input_dir.clone_from(dir);
        }
        if let Some(prefix) = &args.output_prefix {
            self.output_prefix.clone_from(prefix);
        }
        if let Some(name) = &args.meta_file {
            self.meta_file.clone_from(name);
        }
        if let Some(name) = &args.data_file {
            self.data_file.clone_from(name);
        }
        if let Some(endpoint) = &args.hdfs_endpoint {
            self.hdfs_endpoint.clone_from(endpoint);
        }
        if let Some(user) = &args.hdfs_user {
            self.hdfs_user.clone_from(user);
        }
        self.quote_aware |= args.quote_aware;
    }

    /// Rejects settings no run can use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions == 0 {
            return Err(ConfigError::Invalid("partitions must be at least 1".into()));
        }
        if self.meta_file.is_empty() || self.data_file.is_empty() {
            return Err(ConfigError::Invalid("meta_file and data_file must be set".into()));
        }
        Ok(())
    }

    /// Path of the meta document.
    pub fn meta_path(&self) -> PathBuf {
        self.input_dir.join(&self.meta_file)
    }

    /// Path of the block stream.
    pub fn data_path(&self) -> PathBuf {
        self.input_dir.join(&self.data_file)
    }

    /// Output name of partition `index`.
    pub fn partition_name(&self, index: usize) -> String {
        format!("{}{index}.dat", self.output_prefix)
    }

    /// Whether outputs go to WebHDFS.
    pub fn uses_hdfs(&self) -> bool {
        !self.hdfs_endpoint.is_empty()
    }

    /// Block splitting mode.
    pub fn scan_mode(&self) -> ScanMode {
        if self.quote_aware {
            ScanMode::QuoteAware
        } else {
            ScanMode::BraceCount
        }
    }
}
