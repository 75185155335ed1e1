use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const SYSTEM_BIN_DIRS: [&str; 4] = ["/usr/bin", "/bin", "/usr/sbin", "/sbin"];

/// Resolves a bare program name against the system binary directories.
///
/// Names containing `/` are used as given. A name with no executable match
/// is returned unchanged so that spawning falls back to a `PATH` lookup.
pub fn resolve_command_path(program: &str) -> PathBuf {
    resolve_in(program, SYSTEM_BIN_DIRS.iter().map(Path::new))
}

fn resolve_in<'a>(program: &str, dirs: impl IntoIterator<Item = &'a Path>) -> PathBuf {
    if program.contains('/') {
        return PathBuf::from(program);
    }
    dirs.into_iter()
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .unwrap_or_else(|| PathBuf::from(program))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
