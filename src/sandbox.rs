use crate::capability::{BindingSource, Capabilities, CapabilityBinder, CapabilityName, Wrapper};
use crate::config::SandboxConfig;
use crate::emulated::{ChatLog, ChatMessage, Emulation};
use crate::entity::Entity;
use crate::error::SandboxResult;
use crate::events::EventBus;
use crate::host::{HostLookup, NoHost};
use crate::kind::{ObjectKind, ID_KEY};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::info;
use uuid::Uuid;

/// Identity of the campaign object every sandbox starts with.
pub const CAMPAIGN_ID: &str = "root";

/// Channel fired once scripts have registered their handlers.
pub const READY: &str = "ready";

/// Assembles a [`Sandbox`].
pub struct SandboxBuilder {
    config: SandboxConfig,
    host: Box<dyn HostLookup>,
    binder: CapabilityBinder,
}

impl SandboxBuilder {
    pub fn new() -> Self {
        Self {
            config: SandboxConfig::default(),
            host: Box::new(NoHost),
            binder: CapabilityBinder::new(),
        }
    }

    pub fn config(mut self, config: SandboxConfig) -> Self {
        self.config = config;
        self
    }

    /// Host whose implementations take precedence over the emulation.
    pub fn host(mut self, host: impl HostLookup + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    pub fn wrap(mut self, name: CapabilityName, wrapper: Wrapper) -> Self {
        self.binder.add_wrapper(name, wrapper);
        self
    }

    /// Create the campaign and seed objects, then bind capabilities.
    pub fn build(self) -> SandboxResult<Sandbox> {
        let bus = EventBus::new();
        let store = EntityStore::new(bus.clone());

        let mut campaign_fields = self.config.campaign.clone();
        campaign_fields.insert(ID_KEY.to_string(), Value::from(CAMPAIGN_ID));
        let campaign = store.create(ObjectKind::Campaign, campaign_fields)?;

        for seed in &self.config.objects {
            store.create(seed.kind, seed.fields.clone())?;
        }

        let chat_log = ChatLog::default();
        let emulation = Emulation {
            store: store.clone(),
            bus: bus.clone(),
            campaign: campaign.clone(),
            chat_log: chat_log.clone(),
            gm_player_ids: Rc::new(self.config.gm_player_ids.iter().cloned().collect::<HashSet<_>>()),
        };
        let capabilities = self
            .binder
            .bind(self.config.capabilities.as_deref(), &*self.host, &emulation);

        let sandbox = Sandbox {
            id: Uuid::new_v4().to_string(),
            store,
            bus,
            chat_log,
            campaign,
            capabilities,
        };

        info!(
            id = %sandbox.id,
            objects = sandbox.store.len(),
            capabilities = sandbox.capabilities.bindings().count(),
            "Sandbox built"
        );
        Ok(sandbox)
    }
}

impl Default for SandboxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One emulated scripting sandbox: its objects, events and bound surface.
#[derive(Debug)]
pub struct Sandbox {
    pub id: String,
    store: EntityStore,
    bus: EventBus,
    chat_log: ChatLog,
    campaign: Entity,
    capabilities: Capabilities,
}

impl Sandbox {
    pub fn builder() -> SandboxBuilder {
        SandboxBuilder::new()
    }

    /// Build a sandbox with no host and no wrappers.
    pub fn from_config(config: SandboxConfig) -> SandboxResult<Self> {
        SandboxBuilder::new().config(config).build()
    }

    /// The bound surface scripts call into.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn campaign(&self) -> &Entity {
        &self.campaign
    }

    /// Messages sent with `sendChat`, oldest first.
    pub fn chat_log(&self) -> Vec<ChatMessage> {
        self.chat_log.messages()
    }

    /// Fire `ready`, as the host does after loading all scripts.
    pub fn ready(&self) -> usize {
        self.bus.publish(READY, &[])
    }

    pub fn status(&self) -> SandboxStatus {
        let bindings: Vec<_> = self.capabilities.bindings().collect();
        SandboxStatus {
            id: self.id.clone(),
            object_count: self.store.len(),
            bound_count: bindings.len(),
            host_bound_count: bindings
                .iter()
                .filter(|b| b.source == BindingSource::Host)
                .count(),
            chat_message_count: self.chat_log.len(),
        }
    }
}

/// Sandbox status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxStatus {
    pub id: String,
    pub object_count: usize,
    pub bound_count: usize,
    pub host_bound_count: usize,
    pub chat_message_count: usize,
}
