//! Idempotent check-then-create of broker entities at endpoint start.
//!
//! For each descriptor in the endpoint's provisioning plan, in order:
//!
//! 1. list the entity's collection
//! 2. match the configured name case-insensitively
//! 3. if absent, create it with only the explicitly configured settings
//!
//! A topic is always handled before its subscription. Any failure aborts
//! provisioning and the endpoint must not start. The only tolerated create
//! failure is "already exists", which means another process won the race
//! between our list and create calls.

use crate::metrics::ProvisioningMetrics;
use leasebus_core::broker::{BrokerClient, EntityCollection};
use leasebus_core::config::EndpointConfig;
use leasebus_core::error::ProvisioningError;
use leasebus_core::provisioning::ProvisioningDescriptor;
use std::sync::Arc;

/// What provisioning found or did for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStatus {
    /// Listed as present; no create call was made
    AlreadyPresent,
    /// Created by this call
    Created,
    /// Absent when listed, but a concurrent creator got there first
    CreatedConcurrently,
}

/// One entry of a [`ProvisioningReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedEntity {
    /// Full broker path
    pub path: String,
    /// Collection the entity belongs to
    pub collection: EntityCollection,
    /// Outcome
    pub status: ProvisioningStatus,
}

/// Outcome of [`EntityProvisioner::ensure_exists`], in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    entities: Vec<ProvisionedEntity>,
}

impl ProvisioningReport {
    /// Per-entity outcomes.
    #[must_use]
    pub fn entities(&self) -> &[ProvisionedEntity] {
        &self.entities
    }

    /// Status of the entity at `path`.
    #[must_use]
    pub fn status_of(&self, path: &str) -> Option<ProvisioningStatus> {
        self.entities
            .iter()
            .find(|entity| entity.path == path)
            .map(|entity| entity.status)
    }

    /// Number of create calls that succeeded.
    #[must_use]
    pub fn created(&self) -> usize {
        self.entities
            .iter()
            .filter(|entity| entity.status == ProvisioningStatus::Created)
            .count()
    }
}

/// Ensures an endpoint's entities exist.
pub struct EntityProvisioner {
    client: Arc<dyn BrokerClient>,
}

impl EntityProvisioner {
    /// Create a provisioner using `client`.
    #[must_use]
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client }
    }

    /// Verify, and unless disabled create, every entity the endpoint needs.
    ///
    /// # Errors
    ///
    /// - [`ProvisioningError::ListFailed`] if an existence check fails
    /// - [`ProvisioningError::Missing`] if an entity is absent and `autoCreate` is off
    /// - [`ProvisioningError::CreateFailed`] if the broker rejects a create call
    ///   for any reason other than the entity already existing
    pub async fn ensure_exists(
        &self,
        config: &EndpointConfig,
    ) -> Result<ProvisioningReport, ProvisioningError> {
        let mut report = ProvisioningReport::default();
        for descriptor in config.provisioning_plan() {
            let status = self.ensure_one(&descriptor, config.auto_create()).await?;
            report.entities.push(ProvisionedEntity {
                path: descriptor.path(),
                collection: descriptor.collection(),
                status,
            });
        }
        Ok(report)
    }

    async fn ensure_one(
        &self,
        descriptor: &ProvisioningDescriptor,
        auto_create: bool,
    ) -> Result<ProvisioningStatus, ProvisioningError> {
        let collection = descriptor.collection();
        let existing = self
            .client
            .list(&collection)
            .await
            .map_err(|source| ProvisioningError::ListFailed {
                collection: collection.to_string(),
                source,
            })?;

        let name = descriptor.name();
        if existing
            .iter()
            .any(|entity| entity.name.eq_ignore_ascii_case(name))
        {
            tracing::debug!(entity = %descriptor.path(), "Entity already present");
            ProvisioningMetrics::record_present(&collection.to_string());
            return Ok(ProvisioningStatus::AlreadyPresent);
        }

        if !auto_create {
            tracing::error!(entity = %descriptor.path(), "Entity missing and autoCreate is disabled");
            return Err(ProvisioningError::Missing(descriptor.path()));
        }

        let settings = descriptor.explicit_settings();
        match self.client.create(descriptor).await {
            Ok(_) => {
                tracing::info!(
                    entity = %descriptor.path(),
                    settings = ?settings,
                    "Created entity"
                );
                ProvisioningMetrics::record_created(&collection.to_string());
                Ok(ProvisioningStatus::Created)
            }
            Err(source) if source.is_already_exists() => {
                tracing::warn!(
                    entity = %descriptor.path(),
                    "Entity was created concurrently by another process"
                );
                ProvisioningMetrics::record_created(&collection.to_string());
                Ok(ProvisioningStatus::CreatedConcurrently)
            }
            Err(source) => {
                tracing::error!(entity = %descriptor.path(), error = %source, "Failed to create entity");
                Err(ProvisioningError::CreateFailed {
                    entity: descriptor.path(),
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for EntityProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityProvisioner").finish_non_exhaustive()
    }
}
