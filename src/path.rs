//! Path manipulation utilities for overlay-render
//!
//! Every storage backend works on cleaned absolute paths. These helpers do the
//! cleaning lexically, without touching any filesystem, so the in-memory and
//! embedded backends behave exactly like the on-disk one.

use std::path::{Component, Path, PathBuf};

/// Lexically clean an absolute path.
///
/// Removes `.` segments, resolves `..` against the preceding segment and never
/// climbs above the root. Relative input is treated as relative to `/`.
pub fn clean(path: &Path) -> PathBuf {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part),
        }
    }

    let mut cleaned = PathBuf::from("/");
    for part in parts {
        cleaned.push(part);
    }
    cleaned
}

/// Make `path` absolute against `base` and clean it.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean(path)
    } else {
        clean(&base.join(path))
    }
}

/// Returns true if `path` equals `root` or lies below it. Both must be clean.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Express `path` relative to the directory `from`. Both must be clean and
/// absolute. Climbs with `..` where needed.
pub fn relative_to(from: &Path, path: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let target: Vec<_> = path.components().collect();

    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

/// Split a glob pattern into the longest leading directory that contains no
/// glob metacharacters, and the full pattern.
///
/// The directory is where a walk must start to find every possible match.
pub fn glob_root(pattern: &Path) -> PathBuf {
    let mut root = PathBuf::new();
    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[']) {
            break;
        }
        root.push(component.as_os_str());
    }
    root
}
