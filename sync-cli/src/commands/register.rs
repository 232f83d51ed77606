//! Register a resource.

use anyhow::Result;
use mxsync_client::RegisterResourceParams;
use mxsync_types::{ResourceData, ResourceEntity, ResourceState};

use super::{resource_id, task_failure, Client};
use crate::ResourceArgs;

/// Attributes of the resource to register.
#[derive(Debug)]
pub struct Request {
    pub lang: String,
    pub app_name: Option<String>,
    pub device_name: Option<String>,
    pub profile_tag: Option<String>,
    pub url: Option<String>,
    pub format: Option<String>,
    pub kind: String,
    pub append: bool,
}

/// Run the register command.
pub async fn run(client: &Client, args: &ResourceArgs, request: Request) -> Result<()> {
    let id = resource_id(args)?;

    let mut entity = ResourceEntity::new(id, request.lang, ResourceState::Unregistered)
        .with_data(ResourceData {
            url: request.url,
            format: request.format,
        });
    entity.app_display_name = request.app_name;
    entity.device_display_name = request.device_name;
    entity.profile_tag = request.profile_tag;

    let params = RegisterResourceParams::new(entity)
        .with_kind(&request.kind)
        .with_append(request.append);

    let registered = client
        .register_resource(params)
        .await
        .map_err(task_failure)?;

    println!("Registered {} ({})", registered.id, registered.state);
    Ok(())
}
