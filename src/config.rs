use crate::types::Level;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level settings for event construction and filtering.
///
/// Every section is optional when deserializing; missing sections take their defaults.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub flatten: FlattenConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

/// Call-stack capture settings.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackConfig {
    /// Source tree of the logging library. Frames whose file lies under this
    /// directory are trimmed from the top of a captured stack.
    #[serde(default = "default_library_root")]
    pub library_root: PathBuf,
    /// Maximum number of frames recorded per event.
    #[serde(default = "default_stack_max_depth")]
    pub max_depth: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            library_root: default_library_root(),
            max_depth: default_stack_max_depth(),
        }
    }
}

/// Field flattening settings.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlattenConfig {
    /// Containers nested this deep are collapsed into a single string leaf.
    #[serde(default = "default_flatten_max_depth")]
    pub max_depth: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            max_depth: default_flatten_max_depth(),
        }
    }
}

/// Declarative filter chain settings, see [`crate::Filter::from_config`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterConfig {
    #[serde(default)]
    pub level_min: Option<Level>,
    #[serde(default)]
    pub level_max: Option<Level>,
    #[serde(default)]
    pub dedup: bool,
}

fn default_library_root() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/src"))
}

const fn default_stack_max_depth() -> usize {
    100
}

const fn default_flatten_max_depth() -> usize {
    32
}
