//! The resource-existence/openness oracle, modeled as a narrow capability
//! port rather than a concrete store (spec.md §9's "duck-typed validator"
//! re-architecture note). The gateway depends only on this trait; the REST
//! API/domain service that actually answers these questions is out of scope
//! (spec.md §1) and lives behind whatever implementation the binary wires in.

use async_trait::async_trait;
use gateway_events::{ResourceType, ResourceUuid};

/// Minimal projection of a resource the gateway needs to decide whether a
/// `resource:join` may proceed.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
	pub status: String,
}

#[async_trait]
pub trait ResourceValidator: Send + Sync + 'static {
	/// Look up a resource by identity. `None` means "not found".
	async fn find_one(&self, resource_type: &ResourceType, resource_uuid: &ResourceUuid) -> Option<ResourceRecord>;

	/// Given a resource already found, is it currently open for collaboration?
	fn is_resource_open(&self, resource: &ResourceRecord) -> bool;
}

/// Stand-in validator used when no real domain service is wired in (e.g. the
/// binary's default configuration, or tests): every canonically-shaped
/// resource is treated as existing and open. This exists only because the
/// real validator is an external collaborator out of this system's scope
/// (spec.md §1); it is not meant to encode any real business rule.
#[derive(Debug, Clone, Default)]
pub struct AlwaysOpenResourceValidator;

#[async_trait]
impl ResourceValidator for AlwaysOpenResourceValidator {
	async fn find_one(&self, resource_type: &ResourceType, resource_uuid: &ResourceUuid) -> Option<ResourceRecord> {
		Some(ResourceRecord {
			resource_type: resource_type.clone(),
			resource_uuid: resource_uuid.clone(),
			status: "open".to_owned(),
		})
	}

	fn is_resource_open(&self, _resource: &ResourceRecord) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gateway_events::{ResourceType, ResourceUuid};

	#[tokio::test]
	async fn always_open_validator_finds_and_opens_everything() {
		let validator = AlwaysOpenResourceValidator;
		let resource_type = ResourceType::new("surgery-management");
		let resource_uuid = ResourceUuid::new("550e8400-e29b-41d4-a716-446655440000");
		let record = validator.find_one(&resource_type, &resource_uuid).await.expect("should find");
		assert!(validator.is_resource_open(&record));
	}
}
