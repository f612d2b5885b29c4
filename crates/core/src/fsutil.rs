//! Filesystem permission checks shared by the job directory and the
//! on-disk reference store.

use std::io;
use std::path::{Path, PathBuf};

/// Resolve `dir` to an absolute path and verify it is a directory writable
/// by the effective user (owner-, group-, or world-writable, checking
/// ownership accordingly).
pub fn ensure_writable(dir: &Path) -> io::Result<PathBuf> {
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };

    let meta = std::fs::metadata(&dir)?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", dir.display()),
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let mode = meta.mode();
        // SAFETY: geteuid/getegid cannot fail and take no arguments.
        let (euid, egid) = unsafe { (libc::geteuid(), libc::getegid()) };
        let writable = mode & 0o002 != 0
            || (mode & 0o020 != 0 && meta.gid() == egid)
            || (mode & 0o200 != 0 && meta.uid() == euid);
        if !writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not writable", dir.display()),
            ));
        }
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_writable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = ensure_writable(dir.path()).unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(ensure_writable(&missing).is_err());
    }

    #[test]
    fn rejects_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        let err = ensure_writable(&file).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotADirectory);
    }

    #[test]
    #[cfg(unix)]
    fn rejects_read_only_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ro");
        std::fs::create_dir(&target).unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o500)).unwrap();

        // running as root would still be able to write anywhere
        if unsafe { libc::geteuid() } != 0 {
            let err = ensure_writable(&target).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        }
    }
}
