use anyhow::Result;
use rand::{Rng, thread_rng};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User-data directory for one browser run, deleted on drop.
#[derive(Debug)]
pub(crate) struct CustomTempDir {
    path: PathBuf,
}

impl CustomTempDir {
    /// Creates `<base>/<prefix>_<timestamp>_<random>`.
    pub(crate) fn new(base: PathBuf, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(&base)?;
        let name = format!(
            "{}_{}_{}",
            prefix,
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            thread_rng()
                .sample_iter(&rand::distributions::Alphanumeric)
                .take(6)
                .map(char::from)
                .collect::<String>()
        );
        let path = base.join(name);
        std::fs::create_dir(&path)?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CustomTempDir {
    fn drop(&mut self) {
        // Chrome may still hold files for a moment after being killed.
        for _ in 0..3 {
            if std::fs::remove_dir_all(&self.path).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let dir = CustomTempDir::new(base.path().to_path_buf(), "cdp-rasterize").unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("cdp-rasterize_")
        );
        drop(dir);
        assert!(!path.exists());
    }
}
