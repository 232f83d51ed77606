//! Remove a resource.

use anyhow::Result;

use super::{resource_id, task_failure, Client};
use crate::ResourceArgs;

/// Run the remove command.
pub async fn run(client: &Client, args: &ResourceArgs, retry: bool) -> Result<()> {
    let id = resource_id(args)?;

    let result = if retry {
        let policy = client.config().retry_policy();
        client.remove_resource_with_retry(id.clone(), &policy).await
    } else {
        client.remove_resource(id.clone()).await
    };
    result.map_err(task_failure)?;

    println!("Removed {}", id);
    Ok(())
}
