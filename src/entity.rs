use crate::error::{SandboxError, SandboxResult};
use crate::events::{EventBus, SHEET_WORKER_COMPLETED};
use crate::gate::AsyncFieldGate;
use crate::kind::{is_immutable_key, ObjectKind, ID_KEY, TYPE_KEY};
use crate::store::{deregister, Pool};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{error, trace, warn};

struct EntityInner {
    id: String,
    kind: ObjectKind,
    fields: RefCell<Map<String, Value>>,
    pool: Weak<Pool>,
    bus: EventBus,
}

/// Handle to a sandbox object.
///
/// Handles are cheap to clone and compare by identity of the underlying
/// object, not by field contents. A removed object stays readable and
/// writable through any handle still held, it just can no longer be found
/// through the store.
#[derive(Clone)]
pub struct Entity {
    inner: Rc<EntityInner>,
}

impl Entity {
    pub(crate) fn new(
        id: String,
        kind: ObjectKind,
        fields: Map<String, Value>,
        pool: Weak<Pool>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Rc::new(EntityInner {
                id,
                kind,
                fields: RefCell::new(fields),
                pool,
                bus,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    /// Read a field synchronously.
    ///
    /// Lazily loaded fields (see [`AsyncFieldGate`]) cannot be read this
    /// way and fail with [`SandboxError::ContinuationRequired`].
    pub fn get(&self, field: &str) -> SandboxResult<Value> {
        if AsyncFieldGate.requires_continuation(self.kind(), field) {
            error!(id = %self.id(), kind = %self.kind(), field, "Field requires a continuation");
            return Err(SandboxError::ContinuationRequired {
                kind: self.kind(),
                field: field.to_string(),
            });
        }
        Ok(self.read(field))
    }

    /// Read a field and deliver it to `continuation`.
    ///
    /// Works for every field. The emulation invokes the continuation before
    /// returning, but callers must not depend on that.
    pub fn get_async(&self, field: &str, continuation: impl FnOnce(Value)) {
        trace!(id = %self.id(), field, "Delivering field through continuation");
        continuation(self.read(field));
    }

    /// Raw field lookup, bypassing the async gate.
    pub(crate) fn read(&self, field: &str) -> Value {
        match field {
            ID_KEY | "id" => Value::String(self.inner.id.clone()),
            TYPE_KEY | "type" => Value::String(self.kind().as_str().to_string()),
            _ => self
                .inner
                .fields
                .borrow()
                .get(field)
                .cloned()
                .unwrap_or(Value::Null),
        }
    }

    /// Apply a batch of field changes.
    ///
    /// Identity and kind keys are skipped with a warning; every other key is
    /// written. Returns the keys that were rejected.
    pub fn set(&self, changes: Map<String, Value>) -> Vec<String> {
        let mut rejected = Vec::new();
        let mut fields = self.inner.fields.borrow_mut();
        for (key, value) in changes {
            if is_immutable_key(&key) {
                warn!(id = %self.inner.id, kind = %self.inner.kind, key = %key, "Rejected write to read-only field");
                rejected.push(key);
                continue;
            }
            fields.insert(key, value);
        }
        rejected
    }

    /// Set a single field. Returns false when the key is read-only.
    pub fn set_field(&self, key: &str, value: impl Into<Value>) -> bool {
        let mut changes = Map::new();
        changes.insert(key.to_string(), value.into());
        self.set(changes).is_empty()
    }

    /// Apply changes as if made by the character sheet's workers, then fire
    /// `sheetWorkerCompleted`. Only attributes support this.
    pub fn set_with_worker(&self, changes: Map<String, Value>) -> SandboxResult<Vec<String>> {
        if !self.kind().supports_worker() {
            error!(id = %self.id(), kind = %self.kind(), "setWithWorker called on unsupported kind");
            return Err(SandboxError::WorkerUnsupported(self.kind()));
        }
        let rejected = self.set(changes);
        self.inner.bus.publish(SHEET_WORKER_COMPLETED, &[]);
        Ok(rejected)
    }

    /// Remove this object from its store.
    ///
    /// Fails unless this very object currently occupies its identity slot,
    /// so removing twice is an error.
    pub fn remove(&self) -> SandboxResult<()> {
        let Some(pool) = self.inner.pool.upgrade() else {
            error!(id = %self.id(), "Store dropped before remove");
            return Err(SandboxError::NotRegistered(self.id().to_string()));
        };
        deregister(&pool, self)
    }

    /// Whether this object is still discoverable through its store.
    pub fn is_registered(&self) -> bool {
        let Some(pool) = self.inner.pool.upgrade() else {
            return false;
        };
        let registered = pool
            .borrow()
            .get(self.id())
            .map(|current| current.same_entity(self))
            .unwrap_or(false);
        registered
    }

    pub fn same_entity(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Field snapshot including `_id` and `_type`.
    pub fn to_json(&self) -> Value {
        let mut map = self.inner.fields.borrow().clone();
        map.insert(ID_KEY.to_string(), self.read(ID_KEY));
        map.insert(TYPE_KEY.to_string(), self.read(TYPE_KEY));
        Value::Object(map)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("fields", &self.inner.fields.borrow())
            .finish()
    }
}
