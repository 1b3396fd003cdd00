//! Entry lookup with name/type/namespace filters (§4.1 findFirst/Last/All).

use crate::archive::dir::ArchiveDir;
use crate::archive::entry::ArchiveEntry;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Name to match, optionally with `?`/`*` wildcards. Case-insensitive.
    pub match_name: Option<String>,
    pub match_namespace: Option<String>,
    pub search_subdirs: bool,
    pub ignore_ext: bool,
    /// Restrict the search to this subtree; `None` means the whole archive.
    pub dir: Option<ArchiveDir>,
}

impl SearchOptions {
    #[must_use]
    pub fn matches_name(&self, entry: &ArchiveEntry) -> bool {
        let Some(pattern) = &self.match_name else { return true };
        let candidate = if self.ignore_ext { entry.upper_name_no_ext() } else { entry.upper_name() };
        wildcard_match(&candidate, &pattern.to_ascii_uppercase())
    }
}

/// `?` matches exactly one character, `*` matches any run (including empty).
#[must_use]
pub fn wildcard_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    wildcard_match_inner(&t, &p)
}

fn wildcard_match_inner(text: &[char], pattern: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            wildcard_match_inner(text, &pattern[1..])
                || (!text.is_empty() && wildcard_match_inner(&text[1..], pattern))
        }
        Some('?') => !text.is_empty() && wildcard_match_inner(&text[1..], &pattern[1..]),
        Some(c) => !text.is_empty() && text[0] == *c && wildcard_match_inner(&text[1..], &pattern[1..]),
    }
}

/// Collects entries in `dir` (and subdirs if `search_subdirs`) matching `opts`.
#[must_use]
pub fn find_all(dir: &ArchiveDir, opts: &SearchOptions) -> Vec<ArchiveEntry> {
    let mut out = Vec::new();
    find_into(dir, opts, &mut out);
    out
}

fn find_into(dir: &ArchiveDir, opts: &SearchOptions, out: &mut Vec<ArchiveEntry>) {
    for entry in dir.entries() {
        if opts.matches_name(&entry) {
            if let Some(ns) = &opts.match_namespace {
                if entry.ex_prop("namespace").map(|p| p.as_string(0)).as_deref() != Some(ns.as_str()) {
                    continue;
                }
            }
            out.push(entry);
        }
    }
    if opts.search_subdirs {
        for sub in dir.subdirs() {
            find_into(&sub, opts, out);
        }
    }
}

#[must_use]
pub fn find_first(dir: &ArchiveDir, opts: &SearchOptions) -> Option<ArchiveEntry> {
    find_all(dir, opts).into_iter().next()
}

#[must_use]
pub fn find_last(dir: &ArchiveDir, opts: &SearchOptions) -> Option<ArchiveEntry> {
    find_all(dir, opts).into_iter().next_back()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_star_matches_any_run() {
        assert!(wildcard_match("MAP01", "MAP*"));
        assert!(wildcard_match("MAP01", "*01"));
        assert!(!wildcard_match("MAP01", "MAP02"));
    }

    #[test]
    fn wildcard_question_matches_one_char() {
        assert!(wildcard_match("MAP01", "MAP0?"));
        assert!(!wildcard_match("MAP1", "MAP0?"));
    }

    #[test]
    fn find_all_respects_subdir_flag() {
        let root = ArchiveDir::new_root(false);
        root.add_entry(ArchiveEntry::new("THINGS", vec![]), None).unwrap();
        let sub = root.get_or_create_subdir("maps");
        sub.add_entry(ArchiveEntry::new("THINGS", vec![]), None).unwrap();

        let shallow = find_all(&root, &SearchOptions { match_name: Some("THINGS".into()), ..Default::default() });
        assert_eq!(shallow.len(), 1);

        let deep = find_all(
            &root,
            &SearchOptions { match_name: Some("THINGS".into()), search_subdirs: true, ..Default::default() },
        );
        assert_eq!(deep.len(), 2);
    }
}
