//! Capability binding: the callable surface scripts see.
//!
//! Each capability is resolved once when a sandbox is built. A host
//! implementation wins over the emulated one, and registered wrappers are
//! then layered on top in registration order. Every capability shares the
//! same calling convention ([`CapabilityFn`]) so wrappers and hosts can be
//! written once for all of them; [`Capabilities`] adds typed methods on top.

use crate::emulated::Emulation;
use crate::entity::Entity;
use crate::error::{SandboxError, SandboxResult};
use crate::events::Handler;
use crate::host::HostLookup;
use crate::kind::ObjectKind;
use crate::store::MatchOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, error};

/// Named operations of the scripting surface, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapabilityName {
    #[serde(rename = "Campaign")]
    Campaign,
    #[serde(rename = "createObj")]
    CreateObj,
    #[serde(rename = "filterObjs")]
    FilterObjs,
    #[serde(rename = "findObjs")]
    FindObjs,
    #[serde(rename = "getAllObjs")]
    GetAllObjs,
    #[serde(rename = "getAttrByName")]
    GetAttrByName,
    #[serde(rename = "getObj")]
    GetObj,
    #[serde(rename = "log")]
    Log,
    #[serde(rename = "on")]
    On,
    #[serde(rename = "onSheetWorkerCompleted")]
    OnSheetWorkerCompleted,
    #[serde(rename = "playJukeboxPlaylist")]
    PlayJukeboxPlaylist,
    #[serde(rename = "playerIsGM")]
    PlayerIsGm,
    #[serde(rename = "randomInteger")]
    RandomInteger,
    #[serde(rename = "sendChat")]
    SendChat,
    #[serde(rename = "sendPing")]
    SendPing,
    #[serde(rename = "spawnFx")]
    SpawnFx,
    #[serde(rename = "spawnFxBetweenPoints")]
    SpawnFxBetweenPoints,
    #[serde(rename = "spawnFxWithDefinition")]
    SpawnFxWithDefinition,
    #[serde(rename = "stopJukeboxPlaylist")]
    StopJukeboxPlaylist,
    #[serde(rename = "toBack")]
    ToBack,
    #[serde(rename = "toFront")]
    ToFront,
}

impl CapabilityName {
    pub const ALL: [CapabilityName; 21] = [
        CapabilityName::Campaign,
        CapabilityName::CreateObj,
        CapabilityName::FilterObjs,
        CapabilityName::FindObjs,
        CapabilityName::GetAllObjs,
        CapabilityName::GetAttrByName,
        CapabilityName::GetObj,
        CapabilityName::Log,
        CapabilityName::On,
        CapabilityName::OnSheetWorkerCompleted,
        CapabilityName::PlayJukeboxPlaylist,
        CapabilityName::PlayerIsGm,
        CapabilityName::RandomInteger,
        CapabilityName::SendChat,
        CapabilityName::SendPing,
        CapabilityName::SpawnFx,
        CapabilityName::SpawnFxBetweenPoints,
        CapabilityName::SpawnFxWithDefinition,
        CapabilityName::StopJukeboxPlaylist,
        CapabilityName::ToBack,
        CapabilityName::ToFront,
    ];

    /// Conventional script-facing name
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityName::Campaign => "Campaign",
            CapabilityName::CreateObj => "createObj",
            CapabilityName::FilterObjs => "filterObjs",
            CapabilityName::FindObjs => "findObjs",
            CapabilityName::GetAllObjs => "getAllObjs",
            CapabilityName::GetAttrByName => "getAttrByName",
            CapabilityName::GetObj => "getObj",
            CapabilityName::Log => "log",
            CapabilityName::On => "on",
            CapabilityName::OnSheetWorkerCompleted => "onSheetWorkerCompleted",
            CapabilityName::PlayJukeboxPlaylist => "playJukeboxPlaylist",
            CapabilityName::PlayerIsGm => "playerIsGM",
            CapabilityName::RandomInteger => "randomInteger",
            CapabilityName::SendChat => "sendChat",
            CapabilityName::SendPing => "sendPing",
            CapabilityName::SpawnFx => "spawnFx",
            CapabilityName::SpawnFxBetweenPoints => "spawnFxBetweenPoints",
            CapabilityName::SpawnFxWithDefinition => "spawnFxWithDefinition",
            CapabilityName::StopJukeboxPlaylist => "stopJukeboxPlaylist",
            CapabilityName::ToBack => "toBack",
            CapabilityName::ToFront => "toFront",
        }
    }
}

impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityName {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| SandboxError::UnknownCapability(s.to_string()))
    }
}

/// Script-supplied entity filter.
pub type Predicate = Rc<dyn Fn(&Entity) -> bool>;

/// One argument to a capability call.
#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Entity(Entity),
    Predicate(Predicate),
    Handler(Handler),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Arg::Entity(entity) => f.debug_tuple("Entity").field(&entity.id()).finish(),
            Arg::Predicate(_) => f.write_str("Predicate(..)"),
            Arg::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<Entity> for Arg {
    fn from(entity: Entity) -> Self {
        Arg::Entity(entity)
    }
}

/// Ordered argument list with typed accessors.
///
/// Accessors take the capability name so failures say who rejected them.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn new(items: Vec<Arg>) -> Self {
        Self(items)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.0.get(index)
    }

    /// JSON argument at `index`, treating a missing one as absent.
    pub fn optional_value(&self, index: usize) -> Option<&Value> {
        match self.0.get(index) {
            Some(Arg::Value(Value::Null)) | None => None,
            Some(Arg::Value(value)) => Some(value),
            Some(_) => None,
        }
    }

    pub fn value(&self, name: CapabilityName, index: usize) -> SandboxResult<&Value> {
        match self.0.get(index) {
            Some(Arg::Value(value)) => Ok(value),
            other => Err(mismatch(name, index, "a value", other)),
        }
    }

    pub fn str(&self, name: CapabilityName, index: usize) -> SandboxResult<&str> {
        self.value(name, index)?
            .as_str()
            .ok_or_else(|| SandboxError::bad_argument(name.as_str(), format!("argument {index} must be a string")))
    }

    pub fn object(&self, name: CapabilityName, index: usize) -> SandboxResult<&Map<String, Value>> {
        self.value(name, index)?
            .as_object()
            .ok_or_else(|| SandboxError::bad_argument(name.as_str(), format!("argument {index} must be an object")))
    }

    pub fn entity(&self, name: CapabilityName, index: usize) -> SandboxResult<&Entity> {
        match self.0.get(index) {
            Some(Arg::Entity(entity)) => Ok(entity),
            other => Err(mismatch(name, index, "an object", other)),
        }
    }

    pub fn predicate(&self, name: CapabilityName, index: usize) -> SandboxResult<&Predicate> {
        match self.0.get(index) {
            Some(Arg::Predicate(predicate)) => Ok(predicate),
            other => Err(mismatch(name, index, "a predicate", other)),
        }
    }

    pub fn handler(&self, name: CapabilityName, index: usize) -> SandboxResult<&Handler> {
        match self.0.get(index) {
            Some(Arg::Handler(handler)) => Ok(handler),
            other => Err(mismatch(name, index, "a handler", other)),
        }
    }
}

impl From<Vec<Arg>> for Args {
    fn from(items: Vec<Arg>) -> Self {
        Self(items)
    }
}

fn mismatch(name: CapabilityName, index: usize, expected: &str, found: Option<&Arg>) -> SandboxError {
    let reason = match found {
        None => format!("missing argument {index}, expected {expected}"),
        Some(arg) => format!("argument {index} must be {expected}, got {arg:?}"),
    };
    SandboxError::bad_argument(name.as_str(), reason)
}

/// Result of a capability call.
#[derive(Debug, Clone)]
pub enum Ret {
    Unit,
    Value(Value),
    Entity(Option<Entity>),
    Entities(Vec<Entity>),
}

impl Ret {
    pub fn into_value(self, name: CapabilityName) -> SandboxResult<Value> {
        match self {
            Ret::Value(value) => Ok(value),
            _ => Err(unexpected(name, "a value")),
        }
    }

    pub fn into_entity(self, name: CapabilityName) -> SandboxResult<Option<Entity>> {
        match self {
            Ret::Entity(entity) => Ok(entity),
            _ => Err(unexpected(name, "an object")),
        }
    }

    pub fn into_entities(self, name: CapabilityName) -> SandboxResult<Vec<Entity>> {
        match self {
            Ret::Entities(entities) => Ok(entities),
            _ => Err(unexpected(name, "a list of objects")),
        }
    }
}

fn unexpected(name: CapabilityName, expected: &'static str) -> SandboxError {
    SandboxError::UnexpectedReturn {
        capability: name.as_str().to_string(),
        expected,
    }
}

/// Uniform calling convention shared by every capability.
pub type CapabilityFn = Rc<dyn Fn(&Args) -> SandboxResult<Ret>>;

/// Decorator that replaces a resolved capability with one of the same shape.
pub type Wrapper = Rc<dyn Fn(CapabilityName, CapabilityFn) -> CapabilityFn>;

/// External namespace that bound capabilities can be copied into.
pub type Namespace = HashMap<String, CapabilityFn>;

/// Where a bound capability's innermost implementation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingSource {
    Host,
    Emulated,
}

/// The resolved, wrapped form of one capability.
#[derive(Clone)]
pub struct Binding {
    pub name: CapabilityName,
    pub source: BindingSource,
    pub wrappers: usize,
    call: CapabilityFn,
}

impl Binding {
    pub fn call(&self, args: &Args) -> SandboxResult<Ret> {
        (self.call)(args)
    }

    pub fn callable(&self) -> CapabilityFn {
        Rc::clone(&self.call)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("wrappers", &self.wrappers)
            .finish()
    }
}

/// Collects wrappers and resolves capabilities.
#[derive(Clone, Default)]
pub struct CapabilityBinder {
    wrappers: BTreeMap<CapabilityName, Vec<Wrapper>>,
}

impl CapabilityBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wrapper for `name`. Wrappers apply in registration order,
    /// so the last one registered is the outermost.
    pub fn wrap(mut self, name: CapabilityName, wrapper: Wrapper) -> Self {
        self.add_wrapper(name, wrapper);
        self
    }

    pub fn add_wrapper(&mut self, name: CapabilityName, wrapper: Wrapper) {
        self.wrappers.entry(name).or_default().push(wrapper);
    }

    pub fn wrapper_count(&self, name: CapabilityName) -> usize {
        self.wrappers.get(&name).map(Vec::len).unwrap_or(0)
    }

    /// Resolve `names` (every capability when `None`) against `host`, falling
    /// back to `emulation`, and apply registered wrappers.
    pub fn bind(
        &self,
        names: Option<&[CapabilityName]>,
        host: &dyn HostLookup,
        emulation: &Emulation,
    ) -> Capabilities {
        let mut selected: Vec<CapabilityName> = names.map(<[_]>::to_vec).unwrap_or_else(|| CapabilityName::ALL.to_vec());
        selected.sort();
        selected.dedup();

        let mut bindings = BTreeMap::new();
        for name in selected {
            let (source, mut call) = match host.lookup(name) {
                Some(host_impl) => (BindingSource::Host, host_impl),
                None => (BindingSource::Emulated, emulation.implementation(name)),
            };

            let wrappers = self.wrappers.get(&name).map(Vec::as_slice).unwrap_or(&[]);
            for wrapper in wrappers {
                call = wrapper(name, call);
            }

            debug!(capability = %name, source = ?source, wrappers = wrappers.len(), "Bound capability");
            bindings.insert(
                name,
                Binding {
                    name,
                    source,
                    wrappers: wrappers.len(),
                    call,
                },
            );
        }

        Capabilities { bindings }
    }
}

/// The bound capability surface of one sandbox.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    bindings: BTreeMap<CapabilityName, Binding>,
}

impl Capabilities {
    pub fn binding(&self, name: CapabilityName) -> Option<&Binding> {
        self.bindings.get(&name)
    }

    /// Bindings in capability-name order
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn is_bound(&self, name: CapabilityName) -> bool {
        self.bindings.contains_key(&name)
    }

    pub fn call(&self, name: CapabilityName, args: Vec<Arg>) -> SandboxResult<Ret> {
        let Some(binding) = self.bindings.get(&name) else {
            error!(capability = %name, "Capability is not bound in this sandbox");
            return Err(SandboxError::Unbound(name.as_str().to_string()));
        };
        binding.call(&Args::from(args))
    }

    /// Copy bound entries into `target` under their conventional names.
    ///
    /// This is a snapshot; rebinding later does not update `target`.
    /// Returns how many entries were copied.
    pub fn project(&self, names: Option<&[CapabilityName]>, target: &mut Namespace) -> usize {
        let mut copied = 0;
        for binding in self.bindings.values() {
            if names.is_some_and(|names| !names.contains(&binding.name)) {
                continue;
            }
            target.insert(binding.name.as_str().to_string(), binding.callable());
            copied += 1;
        }
        debug!(copied, "Projected capabilities");
        copied
    }

    pub fn campaign(&self) -> SandboxResult<Entity> {
        let name = CapabilityName::Campaign;
        self.call(name, vec![])?
            .into_entity(name)?
            .ok_or_else(|| unexpected(name, "the campaign object"))
    }

    pub fn create_obj(&self, kind: ObjectKind, fields: Map<String, Value>) -> SandboxResult<Entity> {
        let name = CapabilityName::CreateObj;
        self.call(name, vec![kind.as_str().into(), Value::Object(fields).into()])?
            .into_entity(name)?
            .ok_or_else(|| unexpected(name, "the created object"))
    }

    pub fn find_objs(&self, pattern: Map<String, Value>, options: MatchOptions) -> SandboxResult<Vec<Entity>> {
        let name = CapabilityName::FindObjs;
        let options = serde_json::to_value(options)?;
        self.call(name, vec![Value::Object(pattern).into(), options.into()])?
            .into_entities(name)
    }

    pub fn filter_objs(&self, predicate: impl Fn(&Entity) -> bool + 'static) -> SandboxResult<Vec<Entity>> {
        let name = CapabilityName::FilterObjs;
        self.call(name, vec![Arg::Predicate(Rc::new(predicate))])?
            .into_entities(name)
    }

    pub fn get_all_objs(&self) -> SandboxResult<Vec<Entity>> {
        let name = CapabilityName::GetAllObjs;
        self.call(name, vec![])?.into_entities(name)
    }

    pub fn get_obj(&self, kind: ObjectKind, id: &str) -> SandboxResult<Option<Entity>> {
        let name = CapabilityName::GetObj;
        self.call(name, vec![kind.as_str().into(), id.into()])?
            .into_entity(name)
    }

    /// Value of a character's attribute; `value_type` is `current` or `max`.
    pub fn get_attr_by_name(&self, character_id: &str, attribute: &str, value_type: Option<&str>) -> SandboxResult<Value> {
        let name = CapabilityName::GetAttrByName;
        let mut args: Vec<Arg> = vec![character_id.into(), attribute.into()];
        if let Some(value_type) = value_type {
            args.push(value_type.into());
        }
        self.call(name, args)?.into_value(name)
    }

    pub fn send_chat(&self, speaking_as: &str, content: &str) -> SandboxResult<()> {
        self.call(CapabilityName::SendChat, vec![speaking_as.into(), content.into()])
            .map(|_| ())
    }

    pub fn player_is_gm(&self, player_id: &str) -> SandboxResult<bool> {
        let name = CapabilityName::PlayerIsGm;
        self.call(name, vec![player_id.into()])?
            .into_value(name)?
            .as_bool()
            .ok_or_else(|| unexpected(name, "a boolean"))
    }

    pub fn random_integer(&self, max: i64) -> SandboxResult<i64> {
        let name = CapabilityName::RandomInteger;
        self.call(name, vec![Value::from(max).into()])?
            .into_value(name)?
            .as_i64()
            .ok_or_else(|| unexpected(name, "an integer"))
    }

    pub fn log(&self, message: impl Into<Value>) -> SandboxResult<()> {
        self.call(CapabilityName::Log, vec![Arg::Value(message.into())])
            .map(|_| ())
    }

    pub fn on(&self, channel: &str, handler: Handler) -> SandboxResult<()> {
        self.call(CapabilityName::On, vec![channel.into(), Arg::Handler(handler)])
            .map(|_| ())
    }

    pub fn on_sheet_worker_completed(&self, handler: Handler) -> SandboxResult<()> {
        self.call(CapabilityName::OnSheetWorkerCompleted, vec![Arg::Handler(handler)])
            .map(|_| ())
    }

    pub fn spawn_fx(&self, left: f64, top: f64, fx_type: &str, page_id: Option<&str>) -> SandboxResult<()> {
        let args: Vec<Value> = vec![left.into(), top.into(), fx_type.into(), page_id.into()];
        self.call(CapabilityName::SpawnFx, args.into_iter().map(Arg::Value).collect())
            .map(|_| ())
    }

    pub fn spawn_fx_between_points(
        &self,
        start: (f64, f64),
        end: (f64, f64),
        fx_type: &str,
        page_id: Option<&str>,
    ) -> SandboxResult<()> {
        let args: Vec<Value> = vec![
            json!({ "x": start.0, "y": start.1 }),
            json!({ "x": end.0, "y": end.1 }),
            fx_type.into(),
            page_id.into(),
        ];
        self.call(
            CapabilityName::SpawnFxBetweenPoints,
            args.into_iter().map(Arg::Value).collect(),
        )
        .map(|_| ())
    }

    pub fn spawn_fx_with_definition(
        &self,
        left: f64,
        top: f64,
        definition: Value,
        page_id: Option<&str>,
    ) -> SandboxResult<()> {
        let args: Vec<Value> = vec![left.into(), top.into(), definition, page_id.into()];
        self.call(
            CapabilityName::SpawnFxWithDefinition,
            args.into_iter().map(Arg::Value).collect(),
        )
        .map(|_| ())
    }

    pub fn play_jukebox_playlist(&self, playlist_id: &str) -> SandboxResult<()> {
        self.call(CapabilityName::PlayJukeboxPlaylist, vec![playlist_id.into()])
            .map(|_| ())
    }

    pub fn stop_jukebox_playlist(&self) -> SandboxResult<()> {
        self.call(CapabilityName::StopJukeboxPlaylist, vec![])
            .map(|_| ())
    }

    pub fn send_ping(&self, left: f64, top: f64, page_id: &str, player_id: Option<&str>, move_all: bool) -> SandboxResult<()> {
        let args: Vec<Value> = vec![left.into(), top.into(), page_id.into(), player_id.into(), move_all.into()];
        self.call(CapabilityName::SendPing, args.into_iter().map(Arg::Value).collect())
            .map(|_| ())
    }

    pub fn to_front(&self, entity: &Entity) -> SandboxResult<()> {
        self.call(CapabilityName::ToFront, vec![entity.clone().into()])
            .map(|_| ())
    }

    pub fn to_back(&self, entity: &Entity) -> SandboxResult<()> {
        self.call(CapabilityName::ToBack, vec![entity.clone().into()])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_sorted_by_conventional_name() {
        let mut names: Vec<_> = CapabilityName::ALL.iter().map(|n| n.as_str()).collect();
        let declared = names.clone();
        names.sort_unstable();
        assert_eq!(names, declared);

        let mut by_ord = CapabilityName::ALL.to_vec();
        by_ord.sort();
        assert_eq!(by_ord, CapabilityName::ALL.to_vec());
    }

    #[test]
    fn test_name_parsing() {
        assert_eq!("sendChat".parse::<CapabilityName>().unwrap(), CapabilityName::SendChat);
        assert!(matches!(
            "sendchat".parse::<CapabilityName>(),
            Err(SandboxError::UnknownCapability(_))
        ));
        let from_json: CapabilityName = serde_json::from_str("\"playerIsGM\"").unwrap();
        assert_eq!(from_json, CapabilityName::PlayerIsGm);
    }

    #[test]
    fn test_args_accessors_report_capability() {
        let args = Args::new(vec![Arg::Value(json!(3))]);
        let err = args.str(CapabilityName::SendChat, 0).unwrap_err();
        assert!(matches!(err, SandboxError::BadArgument { capability, .. } if capability == "sendChat"));
        assert!(args.handler(CapabilityName::On, 1).is_err());
        assert!(args.optional_value(1).is_none());
    }

    #[test]
    fn test_ret_shape_mismatch() {
        let err = Ret::Unit.into_entities(CapabilityName::FindObjs).unwrap_err();
        assert!(matches!(err, SandboxError::UnexpectedReturn { expected: "a list of objects", .. }));
    }

    #[test]
    fn test_unbound_capability_fails() {
        let capabilities = Capabilities::default();
        assert!(matches!(
            capabilities.send_chat("gm", "hello"),
            Err(SandboxError::Unbound(name)) if name == "sendChat"
        ));
    }
}
