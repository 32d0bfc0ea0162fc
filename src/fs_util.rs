use std::fs;
use std::io::Write;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::error::ScrapeError;

/// Writes `content` next to `path` in a temp file and renames it into place.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ScrapeError> {
    let parent = path
        .parent()
        .ok_or_else(|| ScrapeError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| ScrapeError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".imgt-scrape")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| ScrapeError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| ScrapeError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| ScrapeError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}

/// Resolves `.` and `..` components without touching the filesystem. A `..`
/// at the root stays at the root.
pub fn normalize_lexically(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match normalized.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}

/// True when `path` lies strictly inside `root`, compared component-wise.
pub fn is_within(path: &Utf8Path, root: &Utf8Path) -> bool {
    path != root
        && path.starts_with(root)
        && !path
            .components()
            .any(|component| matches!(component, Utf8Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn scope_check() {
        let root = Utf8Path::new("/data/homo_sapiens");
        assert!(is_within(Utf8Path::new("/data/homo_sapiens/TRBV.fasta"), root));
        assert!(!is_within(Utf8Path::new("/data/library/x.fasta"), root));
        assert!(!is_within(Utf8Path::new("/data/homo_sapiens/../x.fasta"), root));
        assert!(!is_within(root, root));
    }

    #[test]
    fn normalizes_parent_components() {
        assert_eq!(
            normalize_lexically(Utf8Path::new("/work/run/../segs/./x")),
            Utf8PathBuf::from("/work/segs/x")
        );
        assert_eq!(normalize_lexically(Utf8Path::new("/../a")), Utf8PathBuf::from("/a"));
        assert_eq!(normalize_lexically(Utf8Path::new("../../a")), Utf8PathBuf::from("../../a"));
    }

    #[test]
    fn atomic_write_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("out.fasta");
        write_bytes_atomic(&path, b">a\nAC\n").unwrap();
        assert_eq!(std::fs::read_to_string(path.as_std_path()).unwrap(), ">a\nAC\n");
    }
}
