use crate::entity::Entity;
use crate::error::{SandboxError, SandboxResult};
use crate::events::EventBus;
use crate::kind::{is_immutable_key, ObjectKind, ID_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error};
use uuid::Uuid;

/// Identity-keyed storage behind an [`EntityStore`].
pub(crate) type Pool = RefCell<HashMap<String, Entity>>;

/// Options for [`EntityStore::find_matching`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchOptions {
    pub case_insensitive: bool,
}

impl MatchOptions {
    pub fn case_insensitive() -> Self {
        Self {
            case_insensitive: true,
        }
    }
}

/// Registry of live objects for one sandbox.
///
/// Cloning yields another handle onto the same registry.
#[derive(Debug, Clone)]
pub struct EntityStore {
    pool: Rc<Pool>,
    bus: EventBus,
}

impl EntityStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            pool: Rc::new(RefCell::new(HashMap::new())),
            bus,
        }
    }

    /// Create and register a new object.
    ///
    /// The identity comes from `_id` (or `id`) in `initial` when present,
    /// otherwise a fresh one is generated. Kind keys in `initial` are
    /// ignored in favor of `kind`.
    pub fn create(&self, kind: ObjectKind, initial: Map<String, Value>) -> SandboxResult<Entity> {
        let supplied = [ID_KEY, "id"]
            .iter()
            .filter_map(|key| initial.get(*key))
            .find(|value| !matches!(value, Value::Null) && value.as_str() != Some(""));
        let id = match supplied {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        if self.pool.borrow().contains_key(&id) {
            error!(id = %id, kind = %kind, "Identity already registered");
            return Err(SandboxError::DuplicateIdentity(id));
        }

        let mut fields = kind.default_fields();
        fields.extend(initial.into_iter().filter(|(key, _)| !is_immutable_key(key)));

        let entity = Entity::new(id.clone(), kind, fields, Rc::downgrade(&self.pool), self.bus.clone());
        self.pool.borrow_mut().insert(id.clone(), entity.clone());

        debug!(id = %id, kind = %kind, "Created object");
        Ok(entity)
    }

    /// Look up an object by identity
    pub fn get(&self, id: &str) -> Option<Entity> {
        self.pool.borrow().get(id).cloned()
    }

    /// Look up an object by identity, requiring a specific kind.
    pub fn get_typed(&self, kind: ObjectKind, id: &str) -> Option<Entity> {
        self.get(id).filter(|entity| entity.kind() == kind)
    }

    /// Snapshot of every registered object.
    pub fn all(&self) -> Vec<Entity> {
        self.pool.borrow().values().cloned().collect()
    }

    /// Every registered object satisfying `predicate`.
    ///
    /// The predicate runs over a snapshot, so it may use the store itself.
    pub fn find_all(&self, predicate: impl Fn(&Entity) -> bool) -> Vec<Entity> {
        self.all().into_iter().filter(|entity| predicate(entity)).collect()
    }

    /// Objects whose fields equal every pair in `pattern`.
    ///
    /// Keys resolve as in [`Entity::get`]: the kind is matched through
    /// `_type` or `type`, the identity through `_id` or `id`.
    ///
    /// With `case_insensitive`, string values are lowercased on each side
    /// before comparing. A string never matches a non-string.
    pub fn find_matching(&self, pattern: &Map<String, Value>, options: MatchOptions) -> Vec<Entity> {
        self.find_all(|entity| {
            pattern.iter().all(|(key, expected)| {
                let actual = entity.read(key);
                if options.case_insensitive {
                    fold_case(&actual) == fold_case(expected)
                } else {
                    actual == *expected
                }
            })
        })
    }

    pub fn len(&self) -> usize {
        self.pool.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.borrow().is_empty()
    }
}

fn fold_case(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

/// Remove `entity` from `pool` if it is the current occupant of its slot.
pub(crate) fn deregister(pool: &Pool, entity: &Entity) -> SandboxResult<()> {
    let mut pool = pool.borrow_mut();
    let occupant = pool.get(entity.id()).map(|current| current.same_entity(entity));
    match occupant {
        Some(true) => {
            pool.remove(entity.id());
            debug!(id = %entity.id(), kind = %entity.kind(), "Removed object");
            Ok(())
        }
        _ => {
            error!(id = %entity.id(), kind = %entity.kind(), "Cannot remove object that is not registered");
            Err(SandboxError::NotRegistered(entity.id().to_string()))
        }
    }
}
