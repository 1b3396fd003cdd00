//! Small filesystem helpers shared by `DirArchive` and the temp-file-backed
//! container codecs (ZipArchive, VWadArchive).

use std::path::Path;

/// Hidden-file convention used by `archive_dir_ignore_hidden` (§6): a
/// dotfile name, consulted by `DirArchive`'s traversal and change scan.
#[must_use]
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// As [`is_hidden`], but also consults the Windows hidden file attribute
/// when a path is available (on Unix this is equivalent to `is_hidden`).
#[must_use]
pub fn is_hidden_path(path: &Path) -> bool {
    let name_hidden = path.file_name().and_then(|n| n.to_str()).is_some_and(is_hidden);
    if name_hidden {
        return true;
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
        if let Ok(meta) = std::fs::metadata(path) {
            return meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0;
        }
    }
    false
}

/// Builds a `prefix` basename unique among `existing`, mirroring §5's
/// "auto-incremented suffix prevents collision" policy for archives that
/// share a temp-file basename.
#[must_use]
pub fn unique_basename(prefix: &str, existing: &[String]) -> String {
    if !existing.iter().any(|e| e == prefix) {
        return prefix.to_string();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{prefix}-{n}");
        if !existing.iter().any(|e| e == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_names_are_dotfiles() {
        assert!(is_hidden(".gitignore"));
        assert!(!is_hidden("LINEDEFS"));
    }

    #[test]
    fn unique_basename_increments_on_collision() {
        let existing = vec!["slade-zip".to_string(), "slade-zip-1".to_string()];
        assert_eq!(unique_basename("slade-zip", &existing), "slade-zip-2");
        assert_eq!(unique_basename("slade-vwad", &existing), "slade-vwad");
    }
}
