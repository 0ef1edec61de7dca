//! Registry of cooperating components.
//!
//! Names are unique keys. Alignment is clamped to `[0, 1]` on every write.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::errors::{OrchestrationError, OrchestrationResult};
use crate::domain::models::{clamp_alignment, Component, ComponentStatus};

/// Identity, liveness and alignment of every registered component.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: RwLock<HashMap<String, Component>>,
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new active component. An existing entry with the same
    /// name is left untouched.
    pub async fn register(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        initial_alignment: f64,
    ) -> OrchestrationResult<Component> {
        let name = name.into();
        let mut components = self.components.write().await;
        if components.contains_key(&name) {
            return Err(OrchestrationError::DuplicateComponent(name));
        }

        let component = Component::new(name.clone(), kind, initial_alignment);
        tracing::info!(
            component = %component.name,
            kind = %component.kind,
            alignment = component.alignment,
            "component registered"
        );
        components.insert(name, component.clone());
        Ok(component)
    }

    /// Remove a component. Rituals already listing it keep the name.
    pub async fn deregister(&self, name: &str) -> OrchestrationResult<Component> {
        let removed = self
            .components
            .write()
            .await
            .remove(name)
            .ok_or_else(|| OrchestrationError::UnknownComponent(name.to_string()))?;
        tracing::info!(component = %name, "component deregistered");
        Ok(removed)
    }

    /// Refresh one component's heartbeat to now
    pub async fn touch_heartbeat(&self, name: &str) -> OrchestrationResult<()> {
        let mut components = self.components.write().await;
        let component = components
            .get_mut(name)
            .ok_or_else(|| OrchestrationError::UnknownComponent(name.to_string()))?;
        component.last_heartbeat = Utc::now();
        Ok(())
    }

    /// Stamp a heartbeat on every active component. Returns how many were
    /// touched.
    pub async fn refresh_heartbeats(&self) -> usize {
        let now = Utc::now();
        let mut components = self.components.write().await;
        let mut touched = 0;
        for component in components.values_mut().filter(|c| c.is_active()) {
            component.last_heartbeat = now;
            touched += 1;
        }
        touched
    }

    /// Set a component's alignment, clamped to `[0, 1]`. Returns the stored value.
    pub async fn set_alignment(&self, name: &str, value: f64) -> OrchestrationResult<f64> {
        let mut components = self.components.write().await;
        let component = components
            .get_mut(name)
            .ok_or_else(|| OrchestrationError::UnknownComponent(name.to_string()))?;
        component.set_alignment(value);
        tracing::debug!(component = %name, alignment = component.alignment, "alignment set");
        Ok(component.alignment)
    }

    /// Mark a component active or inactive
    pub async fn set_status(&self, name: &str, status: ComponentStatus) -> OrchestrationResult<()> {
        let mut components = self.components.write().await;
        let component = components
            .get_mut(name)
            .ok_or_else(|| OrchestrationError::UnknownComponent(name.to_string()))?;
        if component.status != status {
            tracing::info!(
                component = %name,
                from = component.status.as_str(),
                to = status.as_str(),
                "component status changed"
            );
            component.status = status;
        }
        Ok(())
    }

    /// Copy of one component
    pub async fn get(&self, name: &str) -> Option<Component> {
        self.components.read().await.get(name).cloned()
    }

    /// Snapshot of active components. Order is unspecified.
    pub async fn list_active(&self) -> Vec<Component> {
        self.components
            .read()
            .await
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect()
    }

    /// Overwrite the alignment of every active documentation component.
    /// Returns how many were updated.
    pub async fn set_documentation_alignment(&self, value: f64) -> usize {
        let value = clamp_alignment(value);
        let mut components = self.components.write().await;
        let mut updated = 0;
        for component in components
            .values_mut()
            .filter(|c| c.is_active() && c.is_documentation())
        {
            component.alignment = value;
            updated += 1;
        }
        updated
    }

    /// Number of registered components, inactive ones included
    pub async fn len(&self) -> usize {
        self.components.read().await.len()
    }

    /// Whether nothing is registered
    pub async fn is_empty(&self) -> bool {
        self.components.read().await.is_empty()
    }
}
