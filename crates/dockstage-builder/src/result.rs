use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use dockstage_model::StagingResult;
use tracing::debug;

/// Writes `result` to `path` atomically: a sibling temporary file is written first and then
/// renamed into place. Missing parent directories are created.
pub async fn write_result(path: &Path, result: &StagingResult) -> io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut body = serde_json::to_vec(result)?;
    body.push(b'\n');

    let tmp = temp_sibling(path)?;
    if let Err(e) = tokio::fs::write(&tmp, &body).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }

    debug!(target: "dockstage.builder.result", path = %path.display(), bytes = body.len(), "staging result written");
    Ok(())
}

fn temp_sibling(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let mut tmp = OsString::from(".");
    tmp.push(name);
    tmp.push(format!(".{}.tmp", std::process::id()));
    Ok(path.with_file_name(tmp))
}

#[cfg(test)]
mod tests {
    use dockstage_model::{ExecutionMetadata, ImageRef};

    use super::*;

    fn result() -> StagingResult {
        let md = ExecutionMetadata {
            cmd: vec!["/run".into()],
            ..Default::default()
        };
        StagingResult::new(&ImageRef::new("docker.io", "library/ubuntu", "latest"), &md).unwrap()
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result").join("nested").join("result.json");
        write_result(&path, &result()).await.unwrap();

        let read: StagingResult =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, result());
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![OsString::from("result.json")]);
    }

    #[tokio::test]
    async fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, "stale").unwrap();

        write_result(&path, &result()).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("docker.io/library/ubuntu:latest"));
    }

    #[tokio::test]
    async fn unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let err = write_result(&blocker.join("result.json"), &result()).await;
        assert!(err.is_err());
    }
}
