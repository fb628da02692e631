//! Runtime configuration
//!
//! Limits and the mount namespace are fixed at runtime start. The
//! configuration is plain serde data so a boot loader can hand it over as
//! JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::namespace::ConsolePath;

/// Highest descriptor count the 16-bit ABI can address
pub const DESCRIPTOR_SPACE: u32 = 1 << 16;

/// Highest timer count the 16-bit ABI can address
pub const TIMER_SPACE: u32 = 1 << 16;

/// Errors from loading or validating a configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("{field} = {value} is out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Mount path {0} is declared twice")]
    DuplicateMount(String),

    #[error("Mount path {0} shadows a console path")]
    ReservedPath(String),

    #[error("Mount path {0} has an invalid backing: {1}")]
    InvalidMount(String, String),
}

/// What a mount point is backed by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MountKind {
    /// In-memory byte array, e.g. a file unpacked from the initrd
    Memory {
        #[serde(default)]
        contents: String,
        #[serde(default = "default_writable")]
        writable: bool,
    },
    /// Bounded FIFO: bytes written come back out of `read`
    Loopback { capacity: usize },
    /// Swallows writes, reads end-of-stream
    Null,
    /// Swallows writes, reads zeros
    Zero,
}

fn default_writable() -> bool {
    true
}

/// One entry of the mount namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub path: String,
    #[serde(flatten)]
    pub kind: MountKind,
}

impl MountConfig {
    pub fn new(path: &str, kind: MountKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Size of the descriptor space, including the three reserved descriptors
    pub max_descriptors: u32,
    /// Maximum number of live timers (user and internal)
    pub max_timers: u32,
    /// How many times the console adapter re-polls a busy device
    pub console_retry_limit: u32,
    /// Bound on captured output of the simulated console (`None` = unbounded)
    pub console_output_capacity: Option<usize>,
    /// Mount namespace
    pub mounts: Vec<MountConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_descriptors: 64,
            max_timers: 64,
            console_retry_limit: 8,
            console_output_capacity: None,
            mounts: vec![
                MountConfig::new("/dev/null", MountKind::Null),
                MountConfig::new("/dev/zero", MountKind::Zero),
            ],
        }
    }
}

impl RuntimeConfig {
    /// Parses and validates a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Adds a mount point
    pub fn with_mount(mut self, path: &str, kind: MountKind) -> Self {
        self.mounts.push(MountConfig::new(path, kind));
        self
    }

    /// Checks limits and mount table consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "max_descriptors",
            self.max_descriptors,
            u32::from(core_types::FileDescriptor::FIRST_DYNAMIC),
            DESCRIPTOR_SPACE,
        )?;
        check_range("max_timers", self.max_timers, 1, TIMER_SPACE)?;

        let mut seen = BTreeSet::new();
        for mount in &self.mounts {
            if ConsolePath::parse(&mount.path).is_some() {
                return Err(ConfigError::ReservedPath(mount.path.clone()));
            }
            if !seen.insert(mount.path.as_str()) {
                return Err(ConfigError::DuplicateMount(mount.path.clone()));
            }
            if let MountKind::Loopback { capacity: 0 } = mount.kind {
                return Err(ConfigError::InvalidMount(
                    mount.path.clone(),
                    "loopback capacity must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: u64::from(value),
            min: u64::from(min),
            max: u64::from(max),
        })
    }
}
