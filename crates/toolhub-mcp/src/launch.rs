//! Launch target verification and child environment for tool servers.
//!
//! A server is only spawned once its command, entry point and working
//! directory are all known to exist.

use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use toolhub_core::ServerDescriptor;

#[cfg(unix)]
const PATH_SEPARATOR: char = ':';
#[cfg(windows)]
const PATH_SEPARATOR: char = ';';

/// Everything needed to spawn a verified server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Absolute path of the executable.
    pub program: PathBuf,
    /// Script the launch depends on, if any.
    pub entry_point: Option<PathBuf>,
    /// Working directory for the child.
    pub working_directory: Option<PathBuf>,
}

/// Check that every part of the launch target exists.
///
/// Returns a human-readable reason on failure; the caller maps it to
/// `StartError::LaunchTargetMissing`.
pub fn verify_launch_target(descriptor: &ServerDescriptor) -> Result<LaunchTarget, String> {
    if let Some(dir) = &descriptor.working_directory {
        validate_working_dir(dir)?;
    }

    let program = resolve_command(&descriptor.command, descriptor.working_directory.as_deref())?;

    let entry_point = descriptor.resolved_entry_point();
    if let Some(script) = &entry_point {
        if !script.is_file() {
            return Err(format!("Entry point not found: {}", script.display()));
        }
    }

    Ok(LaunchTarget {
        program,
        entry_point,
        working_directory: descriptor.working_directory.clone(),
    })
}

/// Resolve a command to an executable path.
///
/// Commands containing a path separator are taken as paths (relative ones
/// against `working_dir`); bare names are searched on `PATH`.
pub fn resolve_command(command: &str, working_dir: Option<&Path>) -> Result<PathBuf, String> {
    let as_path = Path::new(command);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        let candidate = if as_path.is_absolute() {
            as_path.to_path_buf()
        } else {
            let base = match working_dir {
                Some(dir) => dir.to_path_buf(),
                None => env::current_dir().map_err(|e| format!("Cannot resolve {command}: {e}"))?,
            };
            base.join(as_path)
        };
        validate_exe_path(&candidate)?;
        return Ok(candidate);
    }

    find_on_path(command, env::var_os("PATH").as_deref())
        .ok_or_else(|| format!("Command '{command}' not found on PATH"))
}

/// Search `path_var` for an executable named `name`.
pub fn find_on_path(name: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| validate_exe_path(candidate).is_ok())
}

/// Validate an executable path: it exists, is a file, and (on Unix) has an
/// execute bit.
pub fn validate_exe_path(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("Executable not found: {}", path.display()));
    }

    if !path.is_file() {
        return Err(format!("Executable path is not a file: {}", path.display()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)
            .map_err(|e| format!("Failed to check permissions: {e}"))?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(format!("File is not executable: {}", path.display()));
        }
    }

    Ok(())
}

/// Validate that a working directory exists and is a directory.
pub fn validate_working_dir(dir: &Path) -> Result<(), String> {
    if !dir.exists() {
        return Err(format!("Working directory does not exist: {}", dir.display()));
    }

    if !dir.is_dir() {
        return Err(format!(
            "Working directory path is not a directory: {}",
            dir.display()
        ));
    }

    Ok(())
}

/// Build the child's `PATH`: the executable's directory first, then the
/// current `PATH`, deduplicated in order.
pub fn build_effective_path(program: &Path) -> OsString {
    let mut entries: Vec<PathBuf> = Vec::new();

    if let Some(dir) = program.parent() {
        if !dir.as_os_str().is_empty() {
            entries.push(dir.to_path_buf());
        }
    }

    if let Some(current) = env::var_os("PATH") {
        entries.extend(env::split_paths(&current).filter(|p| !p.as_os_str().is_empty()));
    }

    let mut seen = HashSet::new();
    entries.retain(|entry| seen.insert(entry.clone()));

    env::join_paths(&entries).unwrap_or_else(|_| {
        // An entry contained the separator itself; fall back to lossy joining.
        let joined: Vec<String> = entries
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        OsString::from(joined.join(&PATH_SEPARATOR.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_validate_exe_path_rejects_nonexistent() {
        let result = validate_exe_path(Path::new("/nonexistent/path/to/exe"));
        assert!(result.unwrap_err().contains("not found"));
    }

    #[test]
    fn test_validate_working_dir_rejects_nonexistent() {
        let result = validate_working_dir(Path::new("/nonexistent/directory"));
        assert!(result.unwrap_err().contains("does not exist"));
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_exe_path_rejects_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("server.py");
        fs::write(&file, "print('hi')").unwrap();

        assert!(validate_exe_path(&file).unwrap_err().contains("not executable"));
    }

    #[test]
    #[cfg(unix)]
    fn test_find_on_path_searches_entries_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        make_executable(&second.path().join("tool-server"));

        let path_var = env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(
            find_on_path("tool-server", Some(&path_var)),
            Some(second.path().join("tool-server"))
        );
        assert_eq!(find_on_path("missing-server", Some(&path_var)), None);
    }

    #[test]
    #[cfg(unix)]
    fn test_relative_command_resolves_against_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        make_executable(&dir.path().join("bin").join("serve"));

        let resolved = resolve_command("bin/serve", Some(dir.path())).unwrap();
        assert_eq!(resolved, dir.path().join("bin").join("serve"));
    }

    #[test]
    #[cfg(unix)]
    fn test_missing_script_is_reported() {
        let descriptor = ServerDescriptor::new("beauty", "sh").with_args(["/nonexistent/server.sh"]);
        let reason = verify_launch_target(&descriptor).unwrap_err();
        assert!(reason.contains("Entry point not found"), "{reason}");
    }

    #[test]
    #[cfg(unix)]
    fn test_present_script_verifies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("server.sh"), "exit 0\n").unwrap();
        let descriptor = ServerDescriptor::new("beauty", "sh")
            .with_args(["server.sh"])
            .with_working_directory(dir.path());

        let target = verify_launch_target(&descriptor).unwrap();
        assert_eq!(target.entry_point, Some(dir.path().join("server.sh")));
        assert!(target.program.is_absolute());
    }

    #[test]
    fn test_missing_working_dir_is_reported_first() {
        let descriptor = ServerDescriptor::new("x", "definitely-not-a-command-7c1e")
            .with_working_directory("/nonexistent/toolhub/dir");
        let reason = verify_launch_target(&descriptor).unwrap_err();
        assert!(reason.contains("Working directory"), "{reason}");
    }

    #[test]
    fn test_build_effective_path_puts_exe_dir_first_without_duplicates() {
        let path = build_effective_path(Path::new("/usr/bin/node"));
        let entries: Vec<PathBuf> = env::split_paths(&path).collect();

        assert_eq!(entries[0], PathBuf::from("/usr/bin"));
        let count = entries
            .iter()
            .filter(|e| *e == Path::new("/usr/bin"))
            .count();
        assert_eq!(count, 1);
    }
}
