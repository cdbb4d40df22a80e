//! Writing a project's workflow text to disk.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::kind::WorkflowKind;

/// Writes `source` into `directory` as the workflow file for `kind`.
///
/// Line endings are normalized to `\n` and scripts are made executable.
/// Empty workflow text is rejected.
pub fn write_workflow(source: &str, directory: &Path, kind: WorkflowKind) -> io::Result<PathBuf> {
    if source.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "project has no workflow to write",
        ));
    }

    std::fs::create_dir_all(directory)?;
    let path = directory.join(kind.artifact_name());
    std::fs::write(&path, source.replace("\r\n", "\n"))?;

    if kind == WorkflowKind::Script {
        make_executable(&path)?;
    }

    debug!("Wrote {} workflow to {}", kind, path.display());
    Ok(path)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_snakefile() {
        let temp = TempDir::new().unwrap();
        let path = write_workflow("rule all:\r\n    shell: 'true'\r\n", temp.path(), WorkflowKind::Pipeline)
            .unwrap();

        assert_eq!(path, temp.path().join("Snakefile"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "rule all:\n    shell: 'true'\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_write_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = write_workflow("#!/bin/sh\necho hi\n", &temp.path().join(".crunch"), WorkflowKind::Script)
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "script.sh");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let temp = TempDir::new().unwrap();
        let err = write_workflow("  \n", temp.path(), WorkflowKind::Script).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!temp.path().join("script.sh").exists());
    }
}
