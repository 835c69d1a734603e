use careledger_core::{ActorId, OrganizationId};

/// Organization context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OrganizationContext {
    organization_id: OrganizationId,
}

impl OrganizationContext {
    pub fn new(organization_id: OrganizationId) -> Self {
        Self { organization_id }
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }
}

/// Acting user, when the gateway forwards one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ActorContext {
    actor_id: Option<ActorId>,
}

impl ActorContext {
    pub fn new(actor_id: Option<ActorId>) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> Option<ActorId> {
        self.actor_id
    }
}
