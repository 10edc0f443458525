use crate::capability::CapabilityName;
use crate::error::{SandboxError, SandboxResult};
use crate::kind::ObjectKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// An object created when the sandbox is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedObject {
    pub kind: ObjectKind,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Sandbox configuration, usually loaded from a JSON fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Players for whom `playerIsGM` answers true.
    pub gm_player_ids: Vec<String>,
    /// Capabilities to bind. All of them when absent.
    pub capabilities: Option<Vec<CapabilityName>>,
    /// Initial fields of the campaign object.
    pub campaign: Map<String, Value>,
    /// Objects to create, in order.
    pub objects: Vec<SeedObject>,
}

impl SandboxConfig {
    pub fn from_json(text: &str) -> SandboxResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> SandboxResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| SandboxError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn with_gm(mut self, player_id: &str) -> Self {
        self.gm_player_ids.push(player_id.to_string());
        self
    }

    pub fn with_capabilities(mut self, names: &[CapabilityName]) -> Self {
        self.capabilities = Some(names.to_vec());
        self
    }

    pub fn with_object(mut self, kind: ObjectKind, fields: Map<String, Value>) -> Self {
        self.objects.push(SeedObject { kind, fields });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SandboxConfig::from_json("{}").unwrap();
        assert_eq!(config, SandboxConfig::default());
        assert!(config.capabilities.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = SandboxConfig::from_json(
            r#"{
                "gm_player_ids": ["gm-1"],
                "capabilities": ["sendChat", "findObjs"],
                "campaign": {"turnorder": "[]"},
                "objects": [
                    {"kind": "character", "fields": {"_id": "c1", "name": "Ayla"}},
                    {"kind": "page"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.gm_player_ids, vec!["gm-1"]);
        assert_eq!(
            config.capabilities,
            Some(vec![CapabilityName::SendChat, CapabilityName::FindObjs])
        );
        assert_eq!(config.objects.len(), 2);
        assert_eq!(config.objects[0].kind, ObjectKind::Character);
        assert!(config.objects[1].fields.is_empty());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = SandboxConfig::from_json(r#"{"objects": [{"kind": "spaceship"}]}"#).unwrap_err();
        assert!(matches!(err, SandboxError::SerdeError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gm_player_ids": ["gm-7"]}}"#).unwrap();

        let config = SandboxConfig::from_file(file.path()).unwrap();
        assert_eq!(config.gm_player_ids, vec!["gm-7"]);
    }

    #[test]
    fn test_from_file_reports_path_on_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = SandboxConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, SandboxError::ConfigError(msg) if msg.contains(&file.path().display().to_string())));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SandboxConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SandboxError::IoError(_)));
    }
}
