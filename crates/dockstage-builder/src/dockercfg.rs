use std::{io, path::Path};

use serde_json::Value;
use tracing::debug;

use crate::config::Credentials;

/// Renders the legacy `.dockercfg` document for one login server.
pub fn dockercfg_contents(creds: &Credentials) -> String {
    let quote = |s: &str| Value::String(s.to_string()).to_string();
    format!(
        "{{{}: {{\"auth\": {}, \"email\": {}}} }}",
        quote(&creds.server),
        quote(&creds.token),
        quote(&creds.email)
    )
}

/// Writes the credentials file read by the daemon CLI on push.
pub async fn write_dockercfg(path: &Path, creds: &Credentials) -> io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, dockercfg_contents(creds)).await?;
    debug!(target: "dockstage.builder.dockercfg", path = %path.display(), server = %creds.server, "registry credentials written");
    Ok(())
}
