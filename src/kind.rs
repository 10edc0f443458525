use crate::error::SandboxError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Field holding an object's identity.
pub const ID_KEY: &str = "_id";
/// Field holding an object's kind.
pub const TYPE_KEY: &str = "_type";

/// Keys that can never be written after construction: the identity and
/// kind keys plus their legacy unprefixed aliases.
pub const IMMUTABLE_KEYS: [&str; 4] = [ID_KEY, TYPE_KEY, "id", "type"];

pub fn is_immutable_key(key: &str) -> bool {
    IMMUTABLE_KEYS.contains(&key)
}

/// The closed set of sandbox object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Campaign,
    Player,
    Page,
    Path,
    Text,
    Graphic,
    Character,
    Attribute,
    Ability,
    Handout,
    Macro,
    RollableTable,
    TableItem,
    Deck,
    Card,
    Hand,
    JukeboxTrack,
    CustFx,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 18] = [
        ObjectKind::Campaign,
        ObjectKind::Player,
        ObjectKind::Page,
        ObjectKind::Path,
        ObjectKind::Text,
        ObjectKind::Graphic,
        ObjectKind::Character,
        ObjectKind::Attribute,
        ObjectKind::Ability,
        ObjectKind::Handout,
        ObjectKind::Macro,
        ObjectKind::RollableTable,
        ObjectKind::TableItem,
        ObjectKind::Deck,
        ObjectKind::Card,
        ObjectKind::Hand,
        ObjectKind::JukeboxTrack,
        ObjectKind::CustFx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Campaign => "campaign",
            ObjectKind::Player => "player",
            ObjectKind::Page => "page",
            ObjectKind::Path => "path",
            ObjectKind::Text => "text",
            ObjectKind::Graphic => "graphic",
            ObjectKind::Character => "character",
            ObjectKind::Attribute => "attribute",
            ObjectKind::Ability => "ability",
            ObjectKind::Handout => "handout",
            ObjectKind::Macro => "macro",
            ObjectKind::RollableTable => "rollabletable",
            ObjectKind::TableItem => "tableitem",
            ObjectKind::Deck => "deck",
            ObjectKind::Card => "card",
            ObjectKind::Hand => "hand",
            ObjectKind::JukeboxTrack => "jukeboxtrack",
            ObjectKind::CustFx => "custfx",
        }
    }

    /// Only attributes go through sheet workers
    pub fn supports_worker(&self) -> bool {
        matches!(self, ObjectKind::Attribute)
    }

    /// Fields a freshly created object of this kind starts with.
    pub fn default_fields(&self) -> Map<String, Value> {
        let defaults = match self {
            ObjectKind::Attribute => json!({ "name": "", "current": "", "max": "" }),
            ObjectKind::Character => json!({
                "name": "",
                "avatar": "",
                "archived": false,
                "inplayerjournals": "",
                "controlledby": "",
            }),
            ObjectKind::Ability => json!({ "name": "", "description": "", "action": "", "istokenaction": false }),
            ObjectKind::Handout => json!({ "name": "Mysterious Note", "avatar": "", "archived": false, "inplayerjournals": "", "controlledby": "" }),
            ObjectKind::Macro => json!({ "name": "", "action": "", "visibleto": "", "istokenaction": false }),
            ObjectKind::Player => json!({ "_displayname": "", "_online": false, "speakingas": "", "color": "#000000" }),
            ObjectKind::Graphic => json!({
                "name": "",
                "represents": "",
                "left": 0,
                "top": 0,
                "width": 70,
                "height": 70,
                "layer": "objects",
            }),
            ObjectKind::Campaign => json!({ "turnorder": "", "initiativepage": false, "playerpageid": false }),
            _ => json!({}),
        };
        match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SandboxError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip_through_from_str() {
        for kind in ObjectKind::ALL {
            assert_eq!(kind.as_str().parse::<ObjectKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "spaceship".parse::<ObjectKind>().unwrap_err();
        assert!(matches!(err, SandboxError::UnknownKind(name) if name == "spaceship"));
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ObjectKind::RollableTable).unwrap();
        assert_eq!(json, "\"rollabletable\"");
    }

    #[test]
    fn test_immutable_keys() {
        assert!(is_immutable_key("_id"));
        assert!(is_immutable_key("type"));
        assert!(!is_immutable_key("name"));
    }

    #[test]
    fn test_only_attributes_support_worker() {
        let supporting: Vec<_> = ObjectKind::ALL.iter().filter(|k| k.supports_worker()).collect();
        assert_eq!(supporting, vec![&ObjectKind::Attribute]);
    }
}
