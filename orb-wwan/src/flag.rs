use async_trait::async_trait;
use color_eyre::{eyre::WrapErr, Result};
use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::fs;

/// Durable "outage alert already sent" marker.
#[async_trait]
pub trait FlagStore: 'static + Send + Sync {
    async fn is_set(&self) -> Result<bool>;
    async fn set(&self) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl<T: FlagStore + ?Sized> FlagStore for Arc<T> {
    async fn is_set(&self) -> Result<bool> {
        (**self).is_set().await
    }

    async fn set(&self) -> Result<()> {
        (**self).set().await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}

/// Flag encoded as the existence of a file.
pub struct FileFlagStore {
    path: PathBuf,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FlagStore for FileFlagStore {
    async fn is_set(&self) -> Result<bool> {
        fs::try_exists(&self.path)
            .await
            .wrap_err_with(|| format!("failed to stat {}", self.path.display()))
    }

    async fn set(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&self.path, chrono::Utc::now().to_rfc3339())
            .await
            .wrap_err_with(|| format!("failed to write {}", self.path.display()))
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e)
                .wrap_err_with(|| format!("failed to remove {}", self.path.display())),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    set: AtomicBool,
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn is_set(&self) -> Result<bool> {
        Ok(self.set.load(Ordering::SeqCst))
    }

    async fn set(&self) -> Result<()> {
        self.set.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.set.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_flag_round_trips_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("notified");
        let flag = FileFlagStore::new(&path);

        assert!(!flag.is_set().await.unwrap());

        flag.set().await.unwrap();
        assert!(flag.is_set().await.unwrap());
        assert!(path.exists());

        // a fresh handle sees the persisted state
        assert!(FileFlagStore::new(&path).is_set().await.unwrap());

        flag.clear().await.unwrap();
        assert!(!flag.is_set().await.unwrap());
    }

    #[tokio::test]
    async fn clearing_an_unset_file_flag_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let flag = FileFlagStore::new(dir.path().join("notified"));

        flag.clear().await.unwrap();

        assert!(!flag.is_set().await.unwrap());
    }

    #[tokio::test]
    async fn memory_flag_toggles() {
        let flag = MemoryFlagStore::default();

        flag.set().await.unwrap();
        assert!(flag.is_set().await.unwrap());

        flag.clear().await.unwrap();
        assert!(!flag.is_set().await.unwrap());
    }
}
