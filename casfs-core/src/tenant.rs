//! Tenant identity: an opaque isolation key, never interpreted by the engine.

use std::fmt;

use uuid::Uuid;

/// Opaque per-tenant isolation key. The engine treats this as a bare
/// identifier — it never inspects, derives, or authenticates it. Per spec
/// §9's redesign note, a [`TenantId`] is passed explicitly on every call
/// instead of being bound to a store instance via a setter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new(id: Uuid) -> Self {
        TenantId(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        TenantId(id)
    }
}
