pub mod volumes;

use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Turn a directory below `root` into the index form: `/`-separated, leading slash,
/// no trailing slash, `""` for the root itself. `None` when `dir` is not under `root`
/// or contains a non-UTF-8 component.
pub fn relative_dir_path(root: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(root).ok()?;
    let mut result = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                result.push('/');
                result.push_str(part.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(result)
}

/// Normalize an operator-supplied directory string: drive letter and prefix components are
/// dropped, backslashes become slashes, empty and `.` segments vanish.
pub fn normalize_dir_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let without_drive = match unified.as_bytes() {
        [letter, b':', ..] if letter.is_ascii_alphabetic() => &unified[2..],
        _ => unified.as_str(),
    };
    let path = get_path_without_drive_letter(Path::new(without_drive));
    let mut result = String::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            result.push('/');
            result.push_str(&part.to_string_lossy());
        }
    }
    result
}

pub fn get_path_without_drive_letter(path: &Path) -> PathBuf {
    let components: Vec<_> = path.components().collect();
    let without_drive = components
        .iter()
        .skip_while(|comp| matches!(comp, Component::Prefix(_)));

    let mut result_path = PathBuf::new();
    for component in without_drive {
        result_path.push(component.as_os_str());
    }
    result_path
}

/// On-disk directory for an index path on a volume mounted at `root`.
pub fn dir_on_volume(root: &Path, dir: &str) -> PathBuf {
    let trimmed = dir.trim_start_matches('/');
    if trimmed.is_empty() {
        root.to_path_buf()
    } else {
        root.join(trimmed)
    }
}

pub fn file_on_volume(root: &Path, dir: &str, file_name: &str) -> PathBuf {
    dir_on_volume(root, dir).join(file_name)
}

/// Last-modified time truncated to whole unix seconds.
pub fn modified_unix(metadata: &Metadata) -> io::Result<i64> {
    let modified: DateTime<Utc> = metadata.modified()?.into();
    Ok(modified.timestamp())
}
