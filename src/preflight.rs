//! Environment checks that must pass before the daemon mounts anything.
//!
//! Recovered failure modes get actionable messages: every check tells the
//! operator the exact command that fixes it.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error(
        "FUSE3 tools not found - install them with:\n\
         For Debian/Ubuntu: sudo apt install -y fuse3\n\
         For Fedora: sudo dnf install -y fuse3\n\
         For Arch Linux: sudo pacman -S fuse3"
    )]
    FusermountMissing,

    #[error(
        "could not open /etc/fuse.conf: {0}\n\
         Create the file and add 'user_allow_other' to enable the allow_other mount option"
    )]
    FuseConfUnreadable(std::io::Error),

    #[error(
        "'user_allow_other' not found in /etc/fuse.conf\n\
         Add it with: echo 'user_allow_other' | sudo tee -a /etc/fuse.conf"
    )]
    UserAllowOtherMissing,

    #[error("directory checks failed. Please fix the following issues:\n\n{}", .0.join("\n\n"))]
    DirectoryChecks(Vec<String>),
}

/// Verify the FUSE userspace helpers this daemon depends on.
#[cfg(target_os = "linux")]
pub fn ensure_fuse() -> Result<(), PreflightError> {
    if !binary_on_path("fusermount3") {
        return Err(PreflightError::FusermountMissing);
    }

    let conf =
        std::fs::read_to_string("/etc/fuse.conf").map_err(PreflightError::FuseConfUnreadable)?;
    if !conf.lines().any(|line| line.trim() == "user_allow_other") {
        return Err(PreflightError::UserAllowOtherMissing);
    }

    debug!("FUSE requirements check passed");
    Ok(())
}

/// On non-Linux platforms the mount helper situation is handled by the FUSE
/// package itself; nothing to verify up front.
#[cfg(not(target_os = "linux"))]
pub fn ensure_fuse() -> Result<(), PreflightError> {
    Ok(())
}

#[cfg(target_os = "linux")]
fn binary_on_path(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).is_file()))
        .unwrap_or(false)
}

/// Probe every tier root for real write access before the daemon starts.
///
/// A stat-level permission bit is not enough on network and FUSE-backed
/// directories, so each root gets an actual create/write/remove exercise.
pub fn check_directory_permissions<'a>(
    dirs: impl IntoIterator<Item = &'a Path>,
) -> Result<(), PreflightError> {
    let uid = nix::unistd::Uid::current();
    let gid = nix::unistd::Gid::current();

    let mut errors = Vec::new();
    for dir in dirs {
        debug!(dir = %dir.display(), "checking directory");
        match std::fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => {
                if let Err(e) = probe_writable(dir) {
                    errors.push(format!(
                        "directory is not writable: {}\nError: {e}\n\nTo fix, run either:\n\
                         1. sudo chown {uid}:{gid} {dir}\n\
                         2. sudo chmod 777 {dir}",
                        dir.display(),
                        dir = dir.display(),
                    ));
                }
            }
            Ok(_) => {
                errors.push(format!("'{}' is not a directory", dir.display()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                errors.push(format!(
                    "directory does not exist: {}\nRun: mkdir -p {}",
                    dir.display(),
                    dir.display()
                ));
            }
            Err(e) => {
                errors.push(format!("failed to check directory {}: {e}", dir.display()));
            }
        }
    }

    if errors.is_empty() {
        debug!("all directory permission checks passed");
        Ok(())
    } else {
        Err(PreflightError::DirectoryChecks(errors))
    }
}

/// Exercise directory-create, exclusive file-create, write, and removal.
fn probe_writable(dir: &Path) -> std::io::Result<()> {
    use std::io::Write as _;

    let test_dir = dir.join(".write_test_dir");
    std::fs::create_dir(&test_dir)?;
    let dir_result = std::fs::remove_dir(&test_dir);

    let test_file = dir.join(".write_test");
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&test_file)?;
    let write_result = file.write_all(b"test");
    drop(file);
    std::fs::remove_file(&test_file)?;

    write_result?;
    dir_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        check_directory_permissions([dir.path()]).unwrap();
        assert!(
            std::fs::read_dir(dir.path()).unwrap().next().is_none(),
            "probe should clean up after itself"
        );
    }

    #[test]
    fn missing_directory_is_reported_with_a_hint() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");

        let err = check_directory_permissions([missing.as_path()]).unwrap_err();
        let PreflightError::DirectoryChecks(errors) = err else {
            panic!("expected directory check errors");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("mkdir -p"), "hint missing: {}", errors[0]);
    }

    #[test]
    fn file_in_place_of_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();

        let err = check_directory_permissions([file.as_path()]).unwrap_err();
        let PreflightError::DirectoryChecks(errors) = err else {
            panic!("expected directory check errors");
        };
        assert!(errors[0].contains("is not a directory"));
    }

    #[test]
    fn all_problems_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        let missing_a = dir.path().join("a");
        let missing_b = dir.path().join("b");

        let err =
            check_directory_permissions([missing_a.as_path(), missing_b.as_path()]).unwrap_err();
        let PreflightError::DirectoryChecks(errors) = err else {
            panic!("expected directory check errors");
        };
        assert_eq!(errors.len(), 2, "both failures should be reported together");
    }
}
