use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq)]
pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    Directory,
    Unknown,
}

/// Symlinks are followed.
pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::metadata(path) {
        Ok(metadata) => {
            if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

/// `<dir>/<stem>.<label>.<extension>`, where `dir` defaults to the input's
/// directory and `extension` to the input's extension.
pub fn generate_output_filename(path: &Path, dir: Option<&Path>, label: &str, extension: Option<&str>) -> PathBuf {
    let stem = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => String::from("output"),
    };
    let ext = match extension {
        Some(ext) => String::from(ext),
        None => match path.extension() {
            Some(ext) => ext.to_string_lossy().into_owned(),
            None => String::from("mkv"),
        },
    };
    let name = format!("{}.{}.{}", stem, label, ext);
    match dir {
        Some(dir) => dir.join(name),
        None => path.with_file_name(name),
    }
}

/// Concat manifests resolve relative entries against the manifest's own
/// directory, so every entry must be absolute.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path))
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_output_filename() {
        assert_eq!(
            generate_output_filename(Path::new("/foo/bar/baz.mkv"), None, "trimmed", None),
            PathBuf::from("/foo/bar/baz.trimmed.mkv"));
        assert_eq!(
            generate_output_filename(Path::new("bar/baz.webm"), Some(Path::new("/out")), "transcoded", Some("mp3")),
            PathBuf::from("/out/baz.transcoded.mp3"));
        assert_eq!(
            generate_output_filename(Path::new("song"), None, "trimmed", None),
            PathBuf::from("song.trimmed.mkv"));
    }

    #[test]
    fn test_classify_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        fs::write(&file, b"data").unwrap();

        assert_eq!(classify_file(&file), DirEntryCategory::RegularFile);
        assert_eq!(classify_file(dir.path()), DirEntryCategory::Directory);
        assert_eq!(classify_file(&dir.path().join("missing.mp4")), DirEntryCategory::DoesNotExist);
        assert_eq!(file_size(&file), Some(4));
    }

    #[test]
    fn test_absolute() {
        assert!(absolute(Path::new("relative/file.mp4")).is_absolute());
        assert_eq!(absolute(Path::new("/already/abs.mp4")), PathBuf::from("/already/abs.mp4"));
    }
}
