use serde::{Deserialize, Serialize};

/// Root configuration structure for narrowscope
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NarrowscopeConfig {
    /// Values whose assignments must never be moved
    #[serde(default)]
    pub risk: RiskConfig,

    /// Output configuration
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

/// Calls and types whose values are unsafe to move to a later point.
///
/// Entries extend the built-in lists unless `extend_defaults` is false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskConfig {
    #[serde(default = "default_extend")]
    pub extend_defaults: bool,

    /// Internal class names; every value-returning call on them is risky
    #[serde(default)]
    pub classes: Vec<String>,

    /// `owner.name(descriptor)` of individual risky methods
    #[serde(default)]
    pub methods: Vec<String>,

    /// Regular expressions matched against `owner.name`
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Type signatures of locals that are never reported
    #[serde(default)]
    pub store_types: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            extend_defaults: default_extend(),
            classes: Vec::new(),
            methods: Vec::new(),
            patterns: Vec::new(),
            store_types: Vec::new(),
        }
    }
}

fn default_extend() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: Option<String>,
}
