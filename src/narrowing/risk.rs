//! Sources of values that must stay where they are assigned.
//!
//! Moving `long t = System.nanoTime()` past other work changes the value it
//! observes; moving `String line = reader.readLine()` changes which line is
//! read. Calls on the classes, methods and patterns below produce risky
//! values, and locals of the listed types are never reported.

use crate::config::RiskConfig;
use crate::core::Result;
use regex::RegexSet;
use std::collections::HashSet;

const DEFAULT_CLASSES: &[&str] = &[
    "java/io/BufferedInputStream",
    "java/io/BufferedReader",
    "java/io/DataInput",
    "java/io/DataInputStream",
    "java/io/FileReader",
    "java/io/InputStream",
    "java/io/InputStreamReader",
    "java/io/ObjectInput",
    "java/io/ObjectInputStream",
    "java/io/RandomAccessFile",
    "java/io/Reader",
    "java/nio/channels/FileChannel",
    "java/sql/ResultSet",
    "java/util/Enumeration",
    "java/util/Iterator",
    "java/util/ListIterator",
    "java/util/Random",
    "java/util/Scanner",
    "java/util/StringTokenizer",
    "java/util/concurrent/BlockingQueue",
];

const DEFAULT_METHODS: &[&str] = &[
    "java/lang/Math.random()D",
    "java/lang/System.currentTimeMillis()J",
    "java/lang/System.nanoTime()J",
    "java/time/Instant.now()Ljava/time/Instant;",
    "java/time/LocalDate.now()Ljava/time/LocalDate;",
    "java/time/LocalDateTime.now()Ljava/time/LocalDateTime;",
    "java/util/Calendar.getInstance()Ljava/util/Calendar;",
    "java/util/UUID.randomUUID()Ljava/util/UUID;",
];

const DEFAULT_PATTERNS: &[&str] = &[r".*serial.*", r".*\.read.*", r".*\.next.*"];

const DEFAULT_STORE_TYPES: &[&str] = &[
    "Ljava/util/concurrent/Future;",
    "Ljava/util/concurrent/CompletableFuture;",
];

#[derive(Debug, Clone)]
pub struct RiskPolicy {
    classes: HashSet<String>,
    methods: HashSet<String>,
    patterns: RegexSet,
    store_types: HashSet<String>,
}

impl RiskPolicy {
    pub fn from_config(config: &RiskConfig) -> Result<Self> {
        let defaults = |list: &[&str]| -> Vec<String> {
            if config.extend_defaults {
                list.iter().map(|s| s.to_string()).collect()
            } else {
                Vec::new()
            }
        };
        let merged = |list: &[&str], extra: &[String]| -> HashSet<String> {
            defaults(list).into_iter().chain(extra.iter().cloned()).collect()
        };

        let mut patterns = defaults(DEFAULT_PATTERNS);
        patterns.extend(config.patterns.iter().cloned());

        Ok(Self {
            classes: merged(DEFAULT_CLASSES, &config.classes),
            methods: merged(DEFAULT_METHODS, &config.methods),
            patterns: RegexSet::new(&patterns)?,
            store_types: merged(DEFAULT_STORE_TYPES, &config.store_types),
        })
    }

    /// Whether the value returned by `owner.name(descriptor)` must not move.
    pub fn is_risky_call(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        if self.classes.contains(owner) {
            return true;
        }
        let qualified = format!("{owner}.{name}");
        self.methods.contains(&format!("{qualified}{descriptor}"))
            || self.patterns.is_match(&qualified)
    }

    pub fn is_dangerous_store_type(&self, signature: &str) -> bool {
        self.store_types.contains(signature)
    }
}

impl Default for RiskPolicy {
    fn default() -> Self {
        let owned = |list: &[&str]| -> HashSet<String> {
            list.iter().map(|s| s.to_string()).collect()
        };
        Self {
            classes: owned(DEFAULT_CLASSES),
            methods: owned(DEFAULT_METHODS),
            patterns: RegexSet::new(DEFAULT_PATTERNS).unwrap_or_else(|_| RegexSet::empty()),
            store_types: owned(DEFAULT_STORE_TYPES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources() {
        let policy = RiskPolicy::default();
        assert!(policy.is_risky_call("java/lang/System", "nanoTime", "()J"));
        assert!(policy.is_risky_call("java/util/Iterator", "hasNext", "()Z"));
        assert!(policy.is_risky_call("com/acme/Parser", "readHeader", "()I"));
        assert!(!policy.is_risky_call("java/lang/String", "length", "()I"));
        assert!(policy.is_dangerous_store_type("Ljava/util/concurrent/Future;"));
        assert!(!policy.is_dangerous_store_type("Ljava/lang/String;"));
    }

    #[test]
    fn test_config_replaces_defaults() {
        let config = RiskConfig {
            extend_defaults: false,
            methods: vec!["com/acme/Clock.tick()J".into()],
            ..RiskConfig::default()
        };
        let policy = RiskPolicy::from_config(&config).unwrap();
        assert!(policy.is_risky_call("com/acme/Clock", "tick", "()J"));
        assert!(!policy.is_risky_call("java/lang/System", "nanoTime", "()J"));
        assert!(!policy.is_risky_call("com/acme/Parser", "readHeader", "()I"));
    }

    #[test]
    fn test_config_extends_defaults() {
        let config = RiskConfig {
            classes: vec!["com/acme/Sensor".into()],
            store_types: vec!["Lcom/acme/Ticket;".into()],
            ..RiskConfig::default()
        };
        let policy = RiskPolicy::from_config(&config).unwrap();
        assert!(policy.is_risky_call("com/acme/Sensor", "value", "()I"));
        assert!(policy.is_risky_call("java/lang/System", "nanoTime", "()J"));
        assert!(policy.is_dangerous_store_type("Lcom/acme/Ticket;"));
    }
}
