//! Filesystem copy of the content tree, laid out like the repository.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::application::store::{LocalMirror, MirrorError};
use crate::domain::documents::DocumentPath;

#[derive(Debug, Clone)]
pub struct LocalContent {
    root: PathBuf,
}

impl LocalContent {
    /// The root does not have to exist; reads then see an empty tree.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path for `relative`, refusing anything that could leave the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf, MirrorError> {
        let candidate = Path::new(relative);
        if relative.is_empty()
            || candidate.is_absolute()
            || candidate.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(MirrorError {
                path: relative.to_string(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "path escapes content root"),
            });
        }
        Ok(self.root.join(candidate))
    }
}

fn mirror_error(path: &str, source: std::io::Error) -> MirrorError {
    MirrorError {
        path: path.to_string(),
        source,
    }
}

#[async_trait]
impl LocalMirror for LocalContent {
    async fn read_document(&self, path: &str) -> Result<Option<Bytes>, MirrorError> {
        let absolute = self.resolve(path)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(mirror_error(path, err)),
        }
    }

    async fn list_names(&self, dir: &str) -> Result<Vec<String>, MirrorError> {
        let absolute = self.resolve(dir)?;
        let mut entries = match fs::read_dir(&absolute).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(mirror_error(dir, err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| mirror_error(dir, err))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write through a temporary sibling and rename, so readers never see a
    /// half-written document.
    async fn write_document(&self, path: &DocumentPath, content: &[u8]) -> Result<(), MirrorError> {
        let relative = path.as_str();
        let absolute = self.resolve(relative)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| mirror_error(relative, err))?;
        }

        let staging = absolute.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        let result = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(content).await?;
            file.flush().await?;
            drop(file);
            fs::rename(&staging, &absolute).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&staging).await;
            return Err(mirror_error(relative, err));
        }
        debug!(target = "gitfolio::local", path = relative, "local copy written");
        Ok(())
    }
}
