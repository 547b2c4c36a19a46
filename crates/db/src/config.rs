// Copyright (C) 2026 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use figment::Figment;
use figment::providers::{Format, Json, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CLUSTERING_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub enabled: bool,
    /// Minimum time between two polls of the backend for remote invalidations, written as a
    /// human-readable span such as `500ms` or `2s`.
    #[serde(with = "humantime_duration")]
    pub delay: Duration,
    /// Identity of this node; a fresh one is generated at startup when unset.
    pub node_id: Option<String>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: DEFAULT_CLUSTERING_DELAY,
            node_id: None,
        }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub name: String,
    pub clustering: ClusteringConfig,
    /// Overrides the dialect's `IN (...)` list limit when smaller.
    pub max_in_list: Option<usize>,
    /// Rename children found under a duplicated name (`name.<millis>`) instead of only logging.
    pub repair_duplicate_child_names: bool,
    /// Create missing tables and indexes when the repository opens.
    pub create_schema: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            clustering: ClusteringConfig::default(),
            max_in_list: None,
            repair_duplicate_child_names: true,
            create_schema: true,
        }
    }
}

impl RepositoryConfig {
    /// Loads a configuration file over the defaults. `.json` files are read as JSON, anything
    /// else as YAML.
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        let mut config_figment = Figment::new().merge(Serialized::defaults(Self::default()));
        config_figment = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => config_figment.merge(Json::file(path)),
            _ => config_figment.merge(Yaml::file(path)),
        };
        config_figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_overrides_defaults() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("repository.yaml");
        std::fs::write(
            &path,
            "name: docs\n\
             clustering:\n  enabled: true\n  delay: 2s\n\
             max_in_list: 100\n",
        )
        .unwrap();
        let config = RepositoryConfig::load(&path).unwrap();
        assert_eq!(config.name, "docs");
        assert!(config.clustering.enabled);
        assert_eq!(config.clustering.delay, Duration::from_secs(2));
        assert_eq!(config.clustering.node_id, None);
        assert_eq!(config.max_in_list, Some(100));
        assert!(config.repair_duplicate_child_names);
    }

    #[test]
    fn test_delay_is_a_human_readable_span() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("repository.json");
        std::fs::write(&path, r#"{"clustering": {"delay": "1m 30s"}}"#).unwrap();
        let config = RepositoryConfig::load(&path).unwrap();
        assert_eq!(config.clustering.delay, Duration::from_secs(90));

        let written = serde_json::to_value(ClusteringConfig::default()).unwrap();
        assert_eq!(written["delay"], serde_json::json!("500ms"));

        std::fs::write(&path, r#"{"clustering": {"delay": "soon"}}"#).unwrap();
        assert!(RepositoryConfig::load(&path).is_err());
    }

    #[test]
    fn test_json_config() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("repository.json");
        std::fs::write(&path, r#"{"repair_duplicate_child_names": false}"#).unwrap();
        let config = RepositoryConfig::load(&path).unwrap();
        assert!(!config.repair_duplicate_child_names);
        assert_eq!(config.clustering, ClusteringConfig::default());
    }
}
