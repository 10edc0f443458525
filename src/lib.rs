//! Roll20 Sandbox - offline emulation of the Roll20 API scripting surface
//!
//! Lets scripts written against the Roll20 API run in an ordinary process,
//! with a per-instance object store, the hierarchical event bus and a
//! capability layer that prefers real host implementations when present.
//!
//! # Features
//!
//! - **Object Store**: pooled sandbox objects with read-only identity keys
//! - **Lazy Fields**: continuation-only reads for notes, bios and tokens
//! - **Event Bus**: cascading `change:graphic:left` style channels and the
//!   one-shot `sheetWorkerCompleted` queue
//! - **Capability Binding**: host pass-through, emulated fallback, wrappers
//!
//! # Quick Start
//!
//! ```rust
//! use roll20_sandbox::{MatchOptions, ObjectKind, Sandbox, SandboxConfig};
//! use serde_json::{json, Map};
//!
//! let sandbox = Sandbox::from_config(SandboxConfig::default())?;
//! let caps = sandbox.capabilities();
//!
//! let mut fields = Map::new();
//! fields.insert("name".into(), json!("Ayla"));
//! let hero = caps.create_obj(ObjectKind::Character, fields)?;
//!
//! let mut pattern = Map::new();
//! pattern.insert("_type".into(), json!("character"));
//! let found = caps.find_objs(pattern, MatchOptions::default())?;
//! assert!(found[0].same_entity(&hero));
//! # Ok::<(), roll20_sandbox::SandboxError>(())
//! ```

pub mod capability;
pub mod config;
pub mod emulated;
pub mod entity;
pub mod error;
pub mod events;
pub mod gate;
pub mod host;
pub mod kind;
pub mod sandbox;
pub mod store;
pub mod wrappers;

// Re-export main types
pub use capability::{
    Arg, Args, Binding, BindingSource, Capabilities, CapabilityBinder, CapabilityFn, CapabilityName,
    Namespace, Predicate, Ret, Wrapper,
};
pub use config::{SandboxConfig, SeedObject};
pub use emulated::{ChatLog, ChatMessage, ChatType, Emulation};
pub use entity::Entity;
pub use error::{SandboxError, SandboxResult};
pub use events::{handler, Channel, EventBus, Handler, Payload, SHEET_WORKER_COMPLETED};
pub use gate::AsyncFieldGate;
pub use host::{HostLookup, HostTable, NoHost};
pub use kind::ObjectKind;
pub use sandbox::{Sandbox, SandboxBuilder, SandboxStatus};
pub use store::{EntityStore, MatchOptions};
