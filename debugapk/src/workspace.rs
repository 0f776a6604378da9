use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const PREFIX: &str = "apkdebug";

/// Scratch directory owned by a single run.
///
/// Holds the unpacked package tree and the generated key-store. The
/// directory is removed when the value is dropped, so every early return
/// through `?` cleans up as well.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a uniquely named directory under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);

        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        tracing::debug!(path = %dir.path().display(), "created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn app_dir(&self) -> PathBuf {
        self.path().join("app")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.app_dir().join("AndroidManifest.xml")
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.path().join("keystore")
    }

    /// Remove the directory now and report whether that worked.
    pub fn close(self) -> io::Result<()> {
        let path = self.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(path = %path.display(), "removed workspace");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_lives_under_the_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(root.path())).unwrap();

        assert!(ws.path().starts_with(root.path()));
        assert!(ws
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("apkdebug"));
        assert_eq!(ws.manifest_path(), ws.path().join("app/AndroidManifest.xml"));
        assert_eq!(ws.keystore_path(), ws.path().join("keystore"));
    }

    #[test]
    fn drop_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(root.path())).unwrap();
        let path = ws.path().to_path_buf();

        std::fs::create_dir_all(ws.app_dir()).unwrap();
        std::fs::write(ws.manifest_path(), "<manifest/>").unwrap();
        drop(ws);

        assert!(!path.exists());
    }

    #[test]
    fn close_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(root.path())).unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(ws.keystore_path(), b"key").unwrap();

        ws.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn each_run_gets_its_own_directory() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(Some(root.path())).unwrap();
        let b = Workspace::create(Some(root.path())).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn missing_root_fails() {
        let root = tempfile::tempdir().unwrap();
        assert!(Workspace::create(Some(&root.path().join("absent"))).is_err());
    }
}
