use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{info, warn};

use crate::error::ImportError;

const ALLOWED_TYPES: [&str; 4] = [
    "text/csv",
    "text/plain",
    "application/csv",
    "application/vnd.ms-excel",
];

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub path: String,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub size_human: String,
}

/// Uploaded catalogs, kept as plain files in one directory.
#[derive(Debug, Clone)]
pub struct SourceStore {
    root: PathBuf,
}

impl SourceStore {
    pub async fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create sources directory {:?}", dir))?;
        let root = fs::canonicalize(dir).await?;
        Ok(Self { root })
    }

    /// Regular files in the directory, newest first.
    pub async fn list(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(err) => {
                    warn!(name, "failed to stat source: {}", err);
                    continue;
                }
            };
            let modified_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();

            files.push(SourceFile {
                path: entry.path().display().to_string(),
                name,
                modified_at,
                size: meta.len(),
                size_human: size_human(meta.len()),
            });
        }

        files.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(files)
    }

    /// Maps a client-supplied path onto an existing file inside the
    /// directory. Relative paths are taken relative to it.
    pub async fn resolve(&self, path: &str) -> Result<PathBuf, ImportError> {
        let invalid = || ImportError::InvalidPath(path.to_string());
        let candidate = Path::new(path);
        if path.is_empty()
            || candidate
                .components()
                .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(invalid());
        }

        let candidate = if candidate.is_absolute() {
            if !candidate.starts_with(&self.root) {
                return Err(invalid());
            }
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let resolved = match fs::canonicalize(&candidate).await {
            Ok(resolved) => resolved,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ImportError::NotFound(path.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        // symlinks may point anywhere
        if !resolved.starts_with(&self.root) || resolved == self.root {
            return Err(invalid());
        }
        if !fs::metadata(&resolved).await?.is_file() {
            return Err(ImportError::NotFound(path.to_string()));
        }
        Ok(resolved)
    }

    pub async fn delete(&self, path: &str) -> Result<PathBuf, ImportError> {
        let resolved = self.resolve(path).await?;
        fs::remove_file(&resolved).await?;
        info!(path = ?resolved, "deleted source");
        Ok(resolved)
    }

    /// Stores an upload as `catalog-<unix ts>.csv`, adding a counter when
    /// that name is taken.
    pub async fn upload<R>(
        &self,
        content_type: Option<&str>,
        mut content: R,
    ) -> Result<PathBuf, ImportError>
    where
        R: AsyncRead + Unpin,
    {
        let mime = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_TYPES.contains(&mime.as_str()) {
            return Err(ImportError::UnsupportedType(if mime.is_empty() {
                "unknown".to_string()
            } else {
                mime
            }));
        }

        let (path, mut file) = self.create_unique(Utc::now().timestamp()).await?;
        let written = async {
            let bytes = tokio::io::copy(&mut content, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(bytes)
        }
        .await;

        match written {
            Ok(bytes) => {
                info!(path = ?path, bytes, "stored upload");
                Ok(path)
            }
            Err(err) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    warn!(path = ?path, "failed to remove partial upload: {}", cleanup);
                }
                Err(err.into())
            }
        }
    }

    async fn create_unique(&self, timestamp: i64) -> std::io::Result<(PathBuf, fs::File)> {
        let mut attempt = 0;
        loop {
            let name = match attempt {
                0 => format!("catalog-{timestamp}.csv"),
                n => format!("catalog-{timestamp}-{n}.csv"),
            };
            let path = self.root.join(name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => return Err(err),
            }
        }
    }
}

pub fn size_human(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, SourceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SourceStore::open(&dir.path().join("sources")).await.unwrap();
        (dir, store)
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(size_human(0), "0 B");
        assert_eq!(size_human(1023), "1023 B");
        assert_eq!(size_human(1536), "1.5 KB");
        assert_eq!(size_human(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(size_human(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[tokio::test]
    async fn upload_stores_a_timestamped_csv() {
        let (_dir, store) = store().await;
        let path = store
            .upload(Some("text/csv; charset=utf-8"), &b"id;title\n1;One\n"[..])
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("catalog-"));
        assert!(name.ends_with(".csv"));
        assert_eq!(fs::read(&path).await.unwrap(), b"id;title\n1;One\n");
    }

    #[tokio::test]
    async fn uploads_in_the_same_second_do_not_collide() {
        let (_dir, store) = store().await;
        let (first, _) = store.create_unique(1700000000).await.unwrap();
        let (second, _) = store.create_unique(1700000000).await.unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("catalog-1700000000-1.csv"));
    }

    #[tokio::test]
    async fn upload_rejects_other_types() {
        let (_dir, store) = store().await;
        for content_type in [Some("image/png"), Some("application/json"), None] {
            let err = store.upload(content_type, &b"x"[..]).await.unwrap_err();
            assert!(matches!(err, ImportError::UnsupportedType(_)));
        }
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_dir, store) = store().await;
        let old = store.root.join("old.csv");
        let new = store.root.join("new.csv");
        fs::write(&old, b"a").await.unwrap();
        fs::write(&new, b"bb").await.unwrap();
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(3600))
            .unwrap();
        fs::create_dir(store.root.join("nested")).await.unwrap();

        let files = store.list().await.unwrap();
        let names: Vec<_> = files.iter().map(|file| file.name.as_str()).collect();
        assert_eq!(names, ["new.csv", "old.csv"]);
        assert_eq!(files[0].size, 2);
        assert_eq!(files[0].size_human, "2 B");
    }

    #[tokio::test]
    async fn resolve_accepts_relative_and_absolute_paths() {
        let (_dir, store) = store().await;
        let path = store.root.join("catalog.csv");
        fs::write(&path, b"a").await.unwrap();

        assert_eq!(store.resolve("catalog.csv").await.unwrap(), path);
        assert_eq!(
            store.resolve(&path.display().to_string()).await.unwrap(),
            path
        );
    }

    #[tokio::test]
    async fn delete_refuses_paths_outside_the_directory() {
        let (dir, store) = store().await;
        let outside = dir.path().join("secret.csv");
        fs::write(&outside, b"a").await.unwrap();

        for path in [
            "../secret.csv".to_string(),
            outside.display().to_string(),
            String::new(),
        ] {
            let err = store.delete(&path).await.unwrap_err();
            assert!(matches!(err, ImportError::InvalidPath(_)), "{path}: {err}");
        }
        assert!(outside.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delete_refuses_symlinks_leaving_the_directory() {
        let (dir, store) = store().await;
        let outside = dir.path().join("secret.csv");
        fs::write(&outside, b"a").await.unwrap();
        std::os::unix::fs::symlink(&outside, store.root.join("link.csv")).unwrap();

        let err = store.delete("link.csv").await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidPath(_)));
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let (_dir, store) = store().await;
        fs::write(store.root.join("catalog.csv"), b"a").await.unwrap();

        store.delete("catalog.csv").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        let err = store.delete("catalog.csv").await.unwrap_err();
        assert!(matches!(err, ImportError::NotFound(_)));
    }
}
