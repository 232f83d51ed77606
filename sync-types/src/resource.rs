//! Resource entities and the remote "set resource" payload.
//!
//! A resource is a locally cached record mirroring something registered on
//! the remote side (a push notification registration, for instance). The
//! cache keeps the last known attributes plus a lifecycle [`ResourceState`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ResourceId, TypesError};

/// Kind sent on registration when the caller does not pick one.
pub const DEFAULT_RESOURCE_KIND: &str = "http";

/// Lifecycle state of a cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceState {
    /// Known locally, not registered remotely.
    Unregistered,
    /// Registration sent, waiting for remote confirmation.
    Registering,
    /// Registered remotely.
    Registered,
    /// Removal has begun.
    Unregistering,
}

impl ResourceState {
    /// Stable column value used by persistent stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "UNREGISTERED",
            Self::Registering => "REGISTERING",
            Self::Registered => "REGISTERED",
            Self::Unregistering => "UNREGISTERING",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceState {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNREGISTERED" => Ok(Self::Unregistered),
            "REGISTERING" => Ok(Self::Registering),
            "REGISTERED" => Ok(Self::Registered),
            "UNREGISTERING" => Ok(Self::Unregistering),
            other => Err(TypesError::InvalidState(other.to_string())),
        }
    }
}

/// Opaque configuration payload forwarded to the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceData {
    /// Delivery endpoint.
    pub url: Option<String>,
    /// Delivery format hint.
    pub format: Option<String>,
}

/// A locally cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntity {
    /// Composite natural key.
    pub id: ResourceId,
    /// Application display name.
    pub app_display_name: Option<String>,
    /// Device display name.
    pub device_display_name: Option<String>,
    /// Profile tag used by the remote side to pick rule sets.
    pub profile_tag: Option<String>,
    /// Preferred language of delivered content.
    pub lang: String,
    /// Opaque configuration payload.
    pub data: ResourceData,
    /// Lifecycle state.
    pub state: ResourceState,
}

impl ResourceEntity {
    /// Create an entity with empty display metadata.
    pub fn new(id: ResourceId, lang: impl Into<String>, state: ResourceState) -> Self {
        Self {
            id,
            app_display_name: None,
            device_display_name: None,
            profile_tag: None,
            lang: lang.into(),
            data: ResourceData::default(),
            state,
        }
    }

    /// Set the application display name.
    pub fn with_app_display_name(mut self, name: &str) -> Self {
        self.app_display_name = Some(name.to_string());
        self
    }

    /// Set the device display name.
    pub fn with_device_display_name(mut self, name: &str) -> Self {
        self.device_display_name = Some(name.to_string());
        self
    }

    /// Set the profile tag.
    pub fn with_profile_tag(mut self, tag: &str) -> Self {
        self.profile_tag = Some(tag.to_string());
        self
    }

    /// Set the configuration payload.
    pub fn with_data(mut self, data: ResourceData) -> Self {
        self.data = data;
        self
    }
}

/// Payload of the remote "set resource" operation.
///
/// `kind` set to `None` serializes as `null` and asks the remote side to
/// delete the resource identified by `key` + `app_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResourceRequest {
    /// Resource key.
    pub key: String,
    /// Application identity.
    pub app_id: String,
    /// Resource kind; `None` means delete.
    pub kind: Option<String>,
    /// Application display name.
    pub display_name: String,
    /// Device display name.
    pub device_display_name: String,
    /// Profile tag.
    pub profile_tag: String,
    /// Preferred language.
    pub lang: String,
    /// Opaque configuration payload.
    pub data: ResourceData,
    /// Whether the remote side keeps other resources with the same key.
    pub append: bool,
}

impl SetResourceRequest {
    /// Build a deletion request from a snapshot of the cached entity.
    ///
    /// Absent display fields are sent as empty strings.
    pub fn removal(entity: &ResourceEntity) -> Self {
        Self::from_entity(entity, None, false)
    }

    /// Build a registration request from the cached entity.
    pub fn registration(entity: &ResourceEntity, kind: &str, append: bool) -> Self {
        Self::from_entity(entity, Some(kind.to_string()), append)
    }

    /// Whether this request asks the remote side to delete the resource.
    pub fn is_removal(&self) -> bool {
        self.kind.is_none()
    }

    fn from_entity(entity: &ResourceEntity, kind: Option<String>, append: bool) -> Self {
        Self {
            key: entity.id.key().to_string(),
            app_id: entity.id.app_id().to_string(),
            kind,
            display_name: entity.app_display_name.clone().unwrap_or_default(),
            device_display_name: entity.device_display_name.clone().unwrap_or_default(),
            profile_tag: entity.profile_tag.clone().unwrap_or_default(),
            lang: entity.lang.clone(),
            data: entity.data.clone(),
            append,
        }
    }
}
