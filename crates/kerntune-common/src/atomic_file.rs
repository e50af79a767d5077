use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Replace the file at `path` with `content`.
///
/// The content is first written to a sibling temporary file which is then renamed over the
/// destination, so a reader never observes a partially written file.
pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let path_tmp = sibling(path, "tmp");
    write_synced(&path_tmp, content)?;
    fs::rename(&path_tmp, path)
}

/// A directory whose files are always replaced together.
///
/// Writing goes to `<name>.tmp`, the current directory is moved aside to `<name>.old` and the new
/// one is renamed into place. When a crash happens between the two renames, only the `.old`
/// directory exists and [AtomicDir::resolve] moves it back.
#[derive(Debug, Clone)]
pub struct AtomicDir {
    path: PathBuf,
    path_tmp: PathBuf,
    path_old: PathBuf,
}

impl AtomicDir {
    /// Create a new atomic directory handle. Nothing is touched on disk.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path: PathBuf = path.into();

        Self {
            path_tmp: sibling(&path, "tmp"),
            path_old: sibling(&path, "old"),
            path,
        }
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory holding the last complete snapshot, if any.
    pub fn resolve(&self) -> io::Result<Option<PathBuf>> {
        if self.path.is_dir() {
            return Ok(Some(self.path.clone()));
        }

        if self.path_old.is_dir() {
            log::warn!(
                "Recovering interrupted write of {:?} from {:?}",
                self.path,
                self.path_old
            );
            fs::rename(&self.path_old, &self.path)?;
            return Ok(Some(self.path.clone()));
        }

        Ok(None)
    }

    /// Replace the whole directory with the provided files.
    pub fn write<'a, I>(&self, files: I) -> io::Result<()>
    where
        I: IntoIterator<Item = (&'a str, Vec<u8>)>,
    {
        if self.path_tmp.exists() {
            fs::remove_dir_all(&self.path_tmp)?;
        }
        fs::create_dir_all(&self.path_tmp)?;

        for (name, content) in files {
            write_synced(&self.path_tmp.join(name), &content)?;
        }

        if self.path.exists() {
            if self.path_old.exists() {
                fs::remove_dir_all(&self.path_old)?;
            }
            fs::rename(&self.path, &self.path_old)?;
        }

        fs::rename(&self.path_tmp, &self.path)?;
        fs::remove_dir_all(&self.path_old).ok();

        Ok(())
    }
}

fn write_synced(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut sibling = path.to_path_buf();
    sibling.set_file_name(format!("{file_name}.{extension}"));
    sibling
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn dir_write_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let atomic = AtomicDir::new(dir.path().join("state"));

        assert!(atomic.resolve().unwrap().is_none());

        atomic.write([("a.csv", b"1".to_vec())]).unwrap();
        atomic.write([("a.csv", b"2".to_vec())]).unwrap();

        let resolved = atomic.resolve().unwrap().unwrap();
        assert_eq!(fs::read(resolved.join("a.csv")).unwrap(), b"2");
        assert!(!dir.path().join("state.old").exists());
    }

    #[test]
    fn interrupted_swap_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let atomic = AtomicDir::new(dir.path().join("state"));
        atomic.write([("a.csv", b"1".to_vec())]).unwrap();

        // Simulate a crash right after the current snapshot was moved aside.
        fs::rename(dir.path().join("state"), dir.path().join("state.old")).unwrap();

        let resolved = atomic.resolve().unwrap().unwrap();
        assert_eq!(fs::read(resolved.join("a.csv")).unwrap(), b"1");
    }
}
