//! CLI command implementations.

use anyhow::anyhow;
use mxsync_client::{MockRemote, SqliteStore, SyncClient, TaskError};
use mxsync_types::ResourceId;

use crate::ResourceArgs;

pub mod list;
pub mod register;
pub mod remove;
pub mod timeline;

/// Client type used by every command.
pub type Client = SyncClient<SqliteStore, MockRemote>;

/// Build a validated resource id from command arguments.
pub fn resource_id(args: &ResourceArgs) -> anyhow::Result<ResourceId> {
    Ok(ResourceId::try_new(
        args.owner.as_str(),
        args.key.as_str(),
        args.app.as_str(),
    )?)
}

/// Turn a task error into the message shown to the user.
pub fn task_failure(error: TaskError) -> anyhow::Error {
    tracing::debug!("Task failed: {:?}", error);
    anyhow!(error.to_failure())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Client;
    use crate::ResourceArgs;
    use mxsync_client::{EngineConfig, MockRemote, SyncClient};
    use std::path::Path;

    pub async fn client(dir: &Path, remote: MockRemote) -> Client {
        let mut config = EngineConfig::default();
        config.storage.database = Some(dir.join("cache.db"));
        SyncClient::open(config, remote).await.unwrap()
    }

    pub fn args(key: &str) -> ResourceArgs {
        ResourceArgs {
            owner: "@alice:example.org".to_string(),
            key: key.to_string(),
            app: "im.app".to_string(),
        }
    }
}
