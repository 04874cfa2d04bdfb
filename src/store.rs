//! Writes into the download tree.
//!
//! Every failure here is a [`Error::Persistence`], which stops the process.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Writes `content` to `path` through a sibling temp file so readers never see a
/// half written file.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::persistence(path, io::Error::other("path has no parent")))?;
    fs::create_dir_all(dir).map_err(|e| Error::persistence(dir, e))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(dir, e))?;
    file.write_all(content)
        .and_then(|_| file.flush())
        .map_err(|e| Error::persistence(path, e))?;

    publish(file, path)
}

/// Renames a finished temp file to `path`, readable like any other stored file.
///
/// Temp files are created owner-only, so the mode is widened to 0644 first.
pub fn publish(file: NamedTempFile, path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| Error::persistence(path, e))?;
    }

    file.persist(path)
        .map_err(|e| Error::persistence(path, e.error))?;

    Ok(())
}

/// Reads a previously stored file, `None` if there is none yet.
pub fn read_existing(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(path, e)),
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn should_create_parents_and_replace() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("poi/reports/2018-01-01/10708/10708-BEOB.csv");

        assert_eq!(read_existing(&path).unwrap(), None);
        write_atomic(&path, b"a").unwrap();
        write_atomic(&path, b"b").unwrap();

        assert_eq!(read_existing(&path).unwrap().as_deref(), Some("b"));
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn should_store_world_readable_files() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("poi/forecasts/2018-01-01/10708/10708-MOSMIX.csv");
        write_atomic(&path, b"a").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn should_fail_fatally_when_parent_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("poi");
        fs::write(&blocker, b"x").unwrap();

        let err = write_atomic(&blocker.join("reports/x.csv"), b"a").unwrap_err();
        assert!(err.is_fatal());
    }
}
