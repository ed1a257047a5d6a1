//! Local state file
//!
//! Address-keyed cache of the last known state of every managed resource,
//! persisted as pretty JSON. Remote truth wins: the CLI refreshes entries before
//! planning and drops entries whose resource is gone.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const STATE_VERSION: u32 = 1;

/// `<type>.<name>`, e.g. `aws_appconfig_extension.main`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub type_name: String,
    pub name: String,
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((type_name, name)) = s.split_once('.') else {
            bail!("invalid resource address {s:?}: expected <type>.<name>");
        };
        if type_name.is_empty() || name.is_empty() || name.contains('.') {
            bail!("invalid resource address {s:?}: expected <type>.<name>");
        }
        Ok(Self {
            type_name: type_name.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// State of one managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub attributes: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub resources: BTreeMap<Address, ResourceState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Load from disk; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", path.display()))?;
        if state.version != STATE_VERSION {
            bail!(
                "state file {} has version {}, expected {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }
        Ok(state)
    }

    /// Write via a temporary file so a crash never leaves half a state file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("writing state file {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("replacing state file {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, address: &Address) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    pub fn attributes(&self, address: &Address) -> Option<&Value> {
        self.get(address).map(|r| &r.attributes)
    }

    pub fn set(&mut self, address: Address, id: String, attributes: Value) {
        self.resources.insert(address, ResourceState { id, attributes });
    }

    pub fn remove(&mut self, address: &Address) -> Option<ResourceState> {
        self.resources.remove(address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.resources.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_parse() {
        let address: Address = "aws_m2_environment.main".parse().unwrap();
        assert_eq!(address.type_name, "aws_m2_environment");
        assert_eq!(address.name, "main");
        assert_eq!(address.to_string(), "aws_m2_environment.main");
        assert!("aws_m2_environment".parse::<Address>().is_err());
        assert!("a.b.c".parse::<Address>().is_err());
        assert!(".b".parse::<Address>().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("awsprov-state-{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.json");
        assert_eq!(StateFile::load(&path).unwrap(), StateFile::default());

        let mut state = StateFile::default();
        let address: Address = "aws_appconfig_extension.main".parse().unwrap();
        state.set(address.clone(), "abc".to_string(), json!({"id": "abc", "name": "x"}));
        state.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.get(&address).unwrap().id, "abc");
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["resources"]["aws_appconfig_extension.main"].is_object());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = std::env::temp_dir().join(format!("awsprov-state-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        std::fs::write(&path, r#"{"version": 9, "resources": {}}"#).unwrap();
        assert!(StateFile::load(&path).is_err());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
