//! Built-in implementations used when the host provides none.

use crate::capability::{Args, CapabilityFn, CapabilityName, Ret};
use crate::entity::Entity;
use crate::error::{SandboxError, SandboxResult};
use crate::events::{EventBus, Payload};
use crate::kind::ObjectKind;
use crate::store::{EntityStore, MatchOptions};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Channel fired for every chat message.
pub const CHAT_MESSAGE: &str = "chat:message";

/// Speaker used when a message does not name a player.
pub const API_PLAYER_ID: &str = "API";

/// Classification of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    General,
    Api,
    Whisper,
    Emote,
    Desc,
}

/// A message sent through `sendChat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub who: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ChatType,
    pub playerid: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_name: Option<String>,
    #[serde(skip)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Build a message the way the chat server would classify it.
    pub fn compose(who: String, playerid: String, raw: &str) -> Self {
        let (kind, content, target_name) = if raw.starts_with('!') {
            (ChatType::Api, raw.to_string(), None)
        } else if let Some(rest) = raw.strip_prefix("/w ") {
            let rest = rest.trim_start();
            let (target, body) = match rest.strip_prefix('"') {
                Some(quoted) => quoted.split_once('"').unwrap_or((quoted, "")),
                None => rest.split_once(' ').unwrap_or((rest, "")),
            };
            (ChatType::Whisper, body.trim_start().to_string(), Some(target.to_string()))
        } else if let Some(rest) = raw.strip_prefix("/em ") {
            (ChatType::Emote, rest.to_string(), None)
        } else if let Some(rest) = raw.strip_prefix("/desc ") {
            (ChatType::Desc, rest.to_string(), None)
        } else {
            (ChatType::General, raw.to_string(), None)
        };

        Self {
            who,
            content,
            kind,
            playerid,
            target_name,
            sent_at: Some(Utc::now()),
        }
    }
}

/// Messages sent in one sandbox, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Rc<RefCell<Vec<ChatMessage>>>,
}

impl ChatLog {
    pub fn push(&self, message: ChatMessage) {
        self.messages.borrow_mut().push(message);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

/// State the emulated capabilities operate on.
#[derive(Debug, Clone)]
pub struct Emulation {
    pub store: EntityStore,
    pub bus: EventBus,
    pub campaign: Entity,
    pub chat_log: ChatLog,
    pub gm_player_ids: Rc<HashSet<String>>,
}

impl Emulation {
    /// Emulated implementation of `name`.
    pub fn implementation(&self, name: CapabilityName) -> CapabilityFn {
        let ctx = self.clone();
        Rc::new(move |args: &Args| {
            let result = ctx.dispatch(name, args);
            if let Err(e) = &result {
                warn!(capability = %name, error = %e, "Capability call rejected");
            }
            result
        })
    }

    fn dispatch(&self, name: CapabilityName, args: &Args) -> SandboxResult<Ret> {
        match name {
            CapabilityName::Campaign => Ok(Ret::Entity(Some(self.campaign.clone()))),
            CapabilityName::CreateObj => self.create_obj(args),
            CapabilityName::FilterObjs => {
                let predicate = args.predicate(name, 0)?;
                Ok(Ret::Entities(self.store.find_all(|entity| predicate(entity))))
            }
            CapabilityName::FindObjs => {
                let pattern = args.object(name, 0)?;
                let options = match args.optional_value(1) {
                    Some(value) => MatchOptions::deserialize(value)
                        .map_err(|e| SandboxError::bad_argument(name.as_str(), e.to_string()))?,
                    None => MatchOptions::default(),
                };
                Ok(Ret::Entities(self.store.find_matching(pattern, options)))
            }
            CapabilityName::GetAllObjs => Ok(Ret::Entities(self.store.all())),
            CapabilityName::GetObj => {
                let kind: ObjectKind = args.str(name, 0)?.parse()?;
                let id = args.str(name, 1)?;
                Ok(Ret::Entity(self.store.get_typed(kind, id)))
            }
            CapabilityName::GetAttrByName => self.get_attr_by_name(args),
            CapabilityName::Log => {
                let message = args.value(name, 0)?;
                match message.as_str() {
                    Some(text) => info!(target: "script", "{}", text),
                    None => info!(target: "script", "{}", message),
                }
                Ok(Ret::Unit)
            }
            CapabilityName::On => {
                let channel = args.str(name, 0)?;
                let handler = args.handler(name, 1)?;
                self.bus.subscribe(channel, Rc::clone(handler));
                Ok(Ret::Unit)
            }
            CapabilityName::OnSheetWorkerCompleted => {
                let handler = args.handler(name, 0)?;
                self.bus.subscribe_once(Rc::clone(handler));
                Ok(Ret::Unit)
            }
            CapabilityName::PlayerIsGm => {
                let player_id = args.str(name, 0)?;
                Ok(Ret::Value(Value::Bool(self.gm_player_ids.contains(player_id))))
            }
            CapabilityName::RandomInteger => {
                let max = args
                    .value(name, 0)?
                    .as_i64()
                    .filter(|max| *max >= 1)
                    .ok_or_else(|| SandboxError::bad_argument(name.as_str(), "max must be an integer of at least 1"))?;
                Ok(Ret::Value(Value::from(rand::thread_rng().gen_range(1..=max))))
            }
            CapabilityName::SendChat => self.send_chat(args),
            CapabilityName::PlayJukeboxPlaylist
            | CapabilityName::SendPing
            | CapabilityName::SpawnFx
            | CapabilityName::SpawnFxBetweenPoints
            | CapabilityName::SpawnFxWithDefinition
            | CapabilityName::StopJukeboxPlaylist
            | CapabilityName::ToBack
            | CapabilityName::ToFront => {
                debug!(capability = %name, args = ?args, "Inert capability called");
                Ok(Ret::Unit)
            }
        }
    }

    fn create_obj(&self, args: &Args) -> SandboxResult<Ret> {
        let name = CapabilityName::CreateObj;
        let kind: ObjectKind = args.str(name, 0)?.parse()?;
        let fields = match args.optional_value(1) {
            Some(Value::Object(fields)) => fields.clone(),
            Some(_) => return Err(SandboxError::bad_argument(name.as_str(), "fields must be an object")),
            None => Map::new(),
        };
        Ok(Ret::Entity(Some(self.store.create(kind, fields)?)))
    }

    fn get_attr_by_name(&self, args: &Args) -> SandboxResult<Ret> {
        let name = CapabilityName::GetAttrByName;
        let character_id = args.str(name, 0)?;
        let attribute = args.str(name, 1)?;
        let field = match args.optional_value(2).and_then(Value::as_str) {
            Some("max") => "max",
            _ => "current",
        };

        let found = self.store.find_all(|entity| {
            entity.kind() == ObjectKind::Attribute
                && entity.read("characterid").as_str() == Some(character_id)
                && entity.read("name").as_str() == Some(attribute)
        });

        match found.first() {
            Some(attr) => Ok(Ret::Value(attr.read(field))),
            None => {
                warn!(character_id, attribute, "No attribute found for character");
                Ok(Ret::Value(Value::Null))
            }
        }
    }

    fn send_chat(&self, args: &Args) -> SandboxResult<Ret> {
        let name = CapabilityName::SendChat;
        let speaking_as = args.str(name, 0)?;
        let content = args.str(name, 1)?;
        let (who, playerid) = self.resolve_speaker(speaking_as);

        if content.starts_with("/r ") || content.starts_with("/roll ") || content.contains("[[") {
            debug!(content, "Rolls in chat are not evaluated");
        }

        let message = ChatMessage::compose(who, playerid, content);
        let payload = serde_json::to_value(&message)?;
        self.chat_log.push(message);
        self.bus.publish(CHAT_MESSAGE, &[Payload::Value(payload)]);
        Ok(Ret::Unit)
    }

    /// Turn a `player|id` / `character|id` reference into a display name.
    fn resolve_speaker(&self, speaking_as: &str) -> (String, String) {
        let Some((prefix, id)) = speaking_as.split_once('|') else {
            return (speaking_as.to_string(), API_PLAYER_ID.to_string());
        };
        let lookup = match prefix {
            "player" => self
                .store
                .get_typed(ObjectKind::Player, id)
                .map(|player| (player.read("_displayname"), id.to_string())),
            "character" => self
                .store
                .get_typed(ObjectKind::Character, id)
                .map(|character| (character.read("name"), API_PLAYER_ID.to_string())),
            _ => None,
        };
        match lookup {
            Some((Value::String(display), playerid)) => (display, playerid),
            _ => {
                warn!(speaking_as, "Could not resolve speaker");
                (speaking_as.to_string(), API_PLAYER_ID.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_api_command() {
        let msg = ChatMessage::compose("GM".into(), "p1".into(), "!roll init");
        assert_eq!(msg.kind, ChatType::Api);
        assert_eq!(msg.content, "!roll init");
    }

    #[test]
    fn test_compose_whisper() {
        let msg = ChatMessage::compose("GM".into(), API_PLAYER_ID.into(), "/w \"Ayla Storm\" watch out");
        assert_eq!(msg.kind, ChatType::Whisper);
        assert_eq!(msg.target_name.as_deref(), Some("Ayla Storm"));
        assert_eq!(msg.content, "watch out");

        let msg = ChatMessage::compose("GM".into(), API_PLAYER_ID.into(), "/w gm secret");
        assert_eq!(msg.target_name.as_deref(), Some("gm"));
        assert_eq!(msg.content, "secret");
    }

    #[test]
    fn test_compose_general_and_emote() {
        assert_eq!(ChatMessage::compose("a".into(), "b".into(), "hello").kind, ChatType::General);
        let emote = ChatMessage::compose("a".into(), "b".into(), "/em waves");
        assert_eq!(emote.kind, ChatType::Emote);
        assert_eq!(emote.content, "waves");
    }

    #[test]
    fn test_message_payload_shape() {
        let msg = ChatMessage::compose("GM".into(), "API".into(), "hi");
        let payload = serde_json::to_value(&msg).unwrap();
        assert_eq!(payload["type"], "general");
        assert_eq!(payload["who"], "GM");
        assert!(payload.get("sent_at").is_none());
        assert!(payload.get("target_name").is_none());
    }
}
