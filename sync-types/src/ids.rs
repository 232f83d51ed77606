//! Identity and ordering types for mxsync.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Composite natural key of a cached resource.
///
/// A resource is identified by the owning account, the resource key chosen
/// by the application (for a push registration this is the push key), and
/// the application identity. Two resources with the same triple are the
/// same resource, both locally and on the remote side.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    owner_id: String,
    key: String,
    app_id: String,
}

impl ResourceId {
    /// Create a new composite key.
    pub fn new(owner_id: impl Into<String>, key: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            key: key.into(),
            app_id: app_id.into(),
        }
    }

    /// Create a composite key, rejecting empty components.
    pub fn try_new(
        owner_id: impl Into<String>,
        key: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Result<Self, TypesError> {
        let id = Self::new(owner_id, key, app_id);
        if id.owner_id.is_empty() {
            return Err(TypesError::EmptyComponent("owner_id"));
        }
        if id.key.is_empty() {
            return Err(TypesError::EmptyComponent("key"));
        }
        if id.app_id.is_empty() {
            return Err(TypesError::EmptyComponent("app_id"));
        }
        Ok(id)
    }

    /// Owning account identity.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Application-chosen resource key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Application identity.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner_id, self.app_id, self.key)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self)
    }
}

/// Identity of a timeline stream (a room, in messaging terms).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a stream identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

/// A monotonically increasing position within a stream.
///
/// Assigned by the event store on append, starting at 1. Positions order
/// events by arrival, never by wall-clock time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Position(u64);

impl Position {
    /// Create a new Position with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this Position.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Position before the first event of any stream.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Increment the position by one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.0)
    }
}

/// Unique identifier of a submitted task.
///
/// UUID v4 format (16 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Create a new random TaskId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_accessors() {
        let id = ResourceId::new("@alice:example.org", "pushkey-1", "im.app.android");
        assert_eq!(id.owner_id(), "@alice:example.org");
        assert_eq!(id.key(), "pushkey-1");
        assert_eq!(id.app_id(), "im.app.android");
    }

    #[test]
    fn resource_id_equality_uses_all_components() {
        let a = ResourceId::new("@alice:example.org", "k", "app");
        let b = ResourceId::new("@alice:example.org", "k", "other-app");
        let c = ResourceId::new("@bob:example.org", "k", "app");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, ResourceId::new("@alice:example.org", "k", "app"));
    }

    #[test]
    fn resource_id_rejects_empty_components() {
        assert_eq!(
            ResourceId::try_new("", "k", "app"),
            Err(TypesError::EmptyComponent("owner_id"))
        );
        assert_eq!(
            ResourceId::try_new("@a:b", "", "app"),
            Err(TypesError::EmptyComponent("key"))
        );
        assert_eq!(
            ResourceId::try_new("@a:b", "k", ""),
            Err(TypesError::EmptyComponent("app_id"))
        );
        assert!(ResourceId::try_new("@a:b", "k", "app").is_ok());
    }

    #[test]
    fn resource_id_display() {
        let id = ResourceId::new("@alice:example.org", "pk", "app");
        assert_eq!(id.to_string(), "@alice:example.org/app/pk");
    }

    #[test]
    fn position_ordering() {
        let p1 = Position::new(1);
        let p2 = Position::new(2);
        assert!(p1 < p2);
        assert_eq!(p1.next(), p2);
    }

    #[test]
    fn position_saturating_next() {
        assert_eq!(Position::new(u64::MAX).next().value(), u64::MAX);
    }

    #[test]
    fn task_id_is_uuid_v4() {
        let id = TaskId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
        assert_ne!(id, TaskId::new());
    }
}
