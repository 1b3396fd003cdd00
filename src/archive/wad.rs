//! Flat lump-list archive (id-software IWAD/PWAD) and its Jaguar (big-endian,
//! LZSS-compressed sprite/flat lumps) variant.

use crate::archive::base::{Archive, ArchiveBase, ArchiveFormatId, MapDesc};
use crate::archive::entry::{ArchiveEntry, Encryption};
use crate::archive::jaguar;
use crate::archive::signal::ArchiveEvent;
use crate::errors::{ArchiveError, ArchiveResult};
use crate::map::MapFormat;
use std::collections::HashSet;

const HEADER_SIZE: usize = 12;
const DIR_ENTRY_SIZE: usize = 16;

/// Lump names considered for Doom/Hexen/Doom64 map-data detection, in the
/// canonical on-disk order a map's lumps appear in.
const MAP_LUMP_ORDER: &[&str] = &[
    "THINGS", "LINEDEFS", "SIDEDEFS", "VERTEXES", "SEGS", "SSECTORS", "NODES", "SECTORS", "REJECT",
    "BLOCKMAP", "BEHAVIOR", "SCRIPTS", "LEAFS", "LIGHTS", "MACROS",
];
const REQUIRED_MAP_LUMPS: &[&str] = &["VERTEXES", "LINEDEFS", "SIDEDEFS", "THINGS", "SECTORS"];

/// `true` if `bytes` looks like a well-formed WAD: magic, in-range
/// directory offset, directory fits within the file.
#[must_use]
pub fn is_wad_archive(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE {
        return false;
    }
    let magic = &bytes[0..4];
    if magic != b"IWAD" && magic != b"PWAD" {
        return false;
    }
    let num_lumps = u32::from_le_bytes(bytes[4..8].try_into().expect("4 bytes")) as usize;
    let dir_offset = u32::from_le_bytes(bytes[8..12].try_into().expect("4 bytes")) as usize;
    dir_offset >= HEADER_SIZE && dir_offset.saturating_add(DIR_ENTRY_SIZE * num_lumps) <= bytes.len()
}

/// Same check as `is_wad_archive` but reading the header fields big-endian,
/// for sniffing the Jaguar variant.
#[must_use]
pub fn is_wad_archive_big_endian(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE {
        return false;
    }
    let magic = &bytes[0..4];
    if magic != b"IWAD" && magic != b"PWAD" {
        return false;
    }
    let num_lumps = u32::from_be_bytes(bytes[4..8].try_into().expect("4 bytes")) as usize;
    let dir_offset = u32::from_be_bytes(bytes[8..12].try_into().expect("4 bytes")) as usize;
    dir_offset >= HEADER_SIZE && dir_offset.saturating_add(DIR_ENTRY_SIZE * num_lumps) <= bytes.len()
}

pub struct WadArchive {
    base: ArchiveBase,
    is_iwad: std::sync::atomic::AtomicBool,
    big_endian: bool,
    lock_iwad: std::sync::atomic::AtomicBool,
}

impl WadArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::with_format(ArchiveFormatId::Wad, false)
    }

    #[must_use]
    pub fn new_jaguar() -> Self {
        Self::with_format(ArchiveFormatId::WadJaguar, true)
    }

    fn with_format(format_id: ArchiveFormatId, big_endian: bool) -> Self {
        Self {
            base: ArchiveBase::new(format_id),
            is_iwad: std::sync::atomic::AtomicBool::new(false),
            big_endian,
            lock_iwad: std::sync::atomic::AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn is_iwad(&self) -> bool {
        self.is_iwad.load(std::sync::atomic::Ordering::Acquire)
    }

    /// `true` if this archive relies on the flat-hack: flats with no
    /// `F_START` marker, implicitly opened from the first lump down to a
    /// trailing `F_END`.
    #[must_use]
    pub fn has_flat_hack(&self) -> bool {
        is_flat_hack(&self.base.entry_tree_as_list())
    }

    pub fn set_lock_iwad(&self, lock: bool) {
        self.lock_iwad.store(lock, std::sync::atomic::Ordering::Release);
    }

    fn read_u32(&self, bytes: &[u8]) -> u32 {
        let arr: [u8; 4] = bytes.try_into().expect("4 bytes");
        if self.big_endian { u32::from_be_bytes(arr) } else { u32::from_le_bytes(arr) }
    }

    fn write_u32(&self, v: u32) -> [u8; 4] {
        if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() }
    }

    /// Detects the entry's namespace sprite override used by `WadJArchive`:
    /// the entry immediately following `index` named exactly `.` marks the
    /// preceding run as sprites.
    fn detect_dot_sprite_override(&self, entries: &[ArchiveEntry], index: usize) -> bool {
        self.big_endian && entries.get(index + 1).is_some_and(|e| e.name() == ".")
    }
}

impl Default for WadArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive for WadArchive {
    fn base(&self) -> &ArchiveBase {
        &self.base
    }

    fn open_bytes(&self, bytes: &[u8]) -> ArchiveResult<()> {
        if !is_wad_archive(bytes) {
            return Err(ArchiveError::InvalidFormat("not a WAD file".to_string()));
        }
        self.is_iwad.store(&bytes[0..4] == b"IWAD", std::sync::atomic::Ordering::Release);
        let num_lumps = self.read_u32(&bytes[4..8]) as usize;
        let dir_offset = self.read_u32(&bytes[8..12]) as usize;

        let root = self.base.root().clone();
        let mut seen_offsets: HashSet<u32> = HashSet::new();
        let mut built: Vec<ArchiveEntry> = Vec::with_capacity(num_lumps);

        for i in 0..num_lumps {
            let rec_off = dir_offset + i * DIR_ENTRY_SIZE;
            if rec_off + DIR_ENTRY_SIZE > bytes.len() {
                return Err(ArchiveError::Corrupt("directory entry past end of file".to_string()));
            }
            let rec = &bytes[rec_off..rec_off + DIR_ENTRY_SIZE];
            let mut offset = self.read_u32(&rec[0..4]);
            let size = self.read_u32(&rec[4..8]);
            let mut name_bytes = [0u8; 8];
            name_bytes.copy_from_slice(&rec[8..16]);

            let jaguar_encrypted = name_bytes[0] & 0x80 != 0;
            name_bytes[0] &= 0x7f;
            let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(8);
            let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();

            if size == 0 && (offset as usize) > bytes.len() {
                offset = 0;
            }
            if !seen_offsets.insert(offset) && size != 0 {
                continue;
            }

            let entry = if jaguar_encrypted {
                let next_offset = (i + 1..num_lumps)
                    .map(|j| self.read_u32(&bytes[dir_offset + j * DIR_ENTRY_SIZE..dir_offset + j * DIR_ENTRY_SIZE + 4]))
                    .find(|&o| o != 0)
                    .unwrap_or(dir_offset as u32);
                let compressed_size = next_offset.saturating_sub(offset) as usize;
                let start = offset as usize;
                let raw_end = (start + compressed_size).min(bytes.len());
                let compressed = &bytes[start..raw_end];
                let mut decoded = jaguar::decode(compressed, size as usize)?;
                if decoded.len() < size as usize {
                    decoded.resize(size as usize, 0);
                }
                let e = ArchiveEntry::new(name, decoded);
                e.set_encryption(Encryption::Jaguar);
                e.set_ex_prop("FullSize", f64::from(size));
                e
            } else {
                let start = offset as usize;
                let data_end = start.saturating_add(size as usize);
                if data_end > bytes.len() {
                    return Err(ArchiveError::Corrupt(format!("lump {name} exceeds file size")));
                }
                ArchiveEntry::new(name, bytes[start..data_end].to_vec())
            };
            entry.set_offset_on_disk(u64::from(offset));
            entry.set_size_on_disk(u64::from(size));
            entry.force_unmodified();
            built.push(entry.clone());
            root.add_entry(entry, None)?;
        }

        update_namespaces(&built);
        scan_includes(&built);
        Ok(())
    }

    fn write_bytes(&self) -> ArchiveResult<Vec<u8>> {
        if self.is_iwad() && self.lock_iwad.load(std::sync::atomic::Ordering::Acquire) {
            return Err(ArchiveError::ReadOnly("refusing to overwrite a locked IWAD".to_string()));
        }
        let entries = self.base.entry_tree_as_list();
        let mut out = Vec::with_capacity(HEADER_SIZE + entries.iter().map(ArchiveEntry::size).sum::<usize>());
        out.extend_from_slice(if self.is_iwad() { b"IWAD" } else { b"PWAD" });
        out.extend_from_slice(&self.write_u32(entries.len() as u32));
        let dir_offset_pos = out.len();
        out.extend_from_slice(&[0u8; 4]); // patched below

        let mut dir_records: Vec<(u32, u32, String)> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let offset = out.len() as u32;
            let bytes = entry.data_if_loaded().unwrap_or_default();
            out.extend_from_slice(&bytes);
            dir_records.push((offset, bytes.len() as u32, entry.name()));
            entry.set_offset_on_disk(u64::from(offset));
            entry.set_size_on_disk(bytes.len() as u64);
        }

        let dir_offset = out.len() as u32;
        out[dir_offset_pos..dir_offset_pos + 4].copy_from_slice(&self.write_u32(dir_offset));

        for (offset, size, name) in dir_records {
            out.extend_from_slice(&self.write_u32(offset));
            out.extend_from_slice(&self.write_u32(size));
            let mut name_field = [0u8; 8];
            let bytes = name.as_bytes();
            let n = bytes.len().min(8);
            name_field[..n].copy_from_slice(&bytes[..n]);
            out.extend_from_slice(&name_field);
        }

        for entry in &entries {
            entry.force_unmodified();
        }
        self.base.emit(ArchiveEvent::Saved);
        Ok(out)
    }

    fn detect_maps(&self) -> Vec<MapDesc> {
        let entries = self.base.entry_tree_as_list();
        detect_doom_style_maps(&entries)
    }
}

/// Returns the lump names between a few bare `#include "NAME"` tokens in a
/// text entry (ACS/DECORATE source); a lightweight stand-in for full
/// preprocessor-directive scanning.
#[must_use]
pub fn detect_includes(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("#include") {
            if let Some(start) = rest.find('"') {
                if let Some(end) = rest[start + 1..].find('"') {
                    out.push(rest[start + 1..start + 1 + end].to_string());
                }
            }
        }
    }
    out
}

/// Lumps known to carry `#include` directives into other script lumps.
const INCLUDE_BEARING_LUMPS: &[&str] = &["DECORATE", "GLDEFS", "ZSCRIPT", "SBARINFO", "MODELDEF"];

/// Scans every `INCLUDE_BEARING_LUMPS` entry for `#include` directives and
/// tags each resolved target entry with the includer's name, so later
/// dependency-aware tooling (e.g. "is this sprite actually reachable")
/// doesn't need to re-scan the text lumps itself.
fn scan_includes(entries: &[ArchiveEntry]) {
    for entry in entries {
        if !INCLUDE_BEARING_LUMPS.contains(&entry.upper_name_no_ext().as_str()) {
            continue;
        }
        let Some(data) = entry.data_if_loaded() else { continue };
        let text = String::from_utf8_lossy(&data);
        let includes = detect_includes(&text);
        if includes.is_empty() {
            continue;
        }
        for included_name in &includes {
            if let Some(target) = entries.iter().find(|e| e.name().eq_ignore_ascii_case(included_name)) {
                target.set_ex_prop("IncludedBy", entry.name());
            }
        }
        entry.set_ex_prop("Includes", includes.join(","));
    }
}

fn fold_marker_key(prefix: &str) -> String {
    match prefix {
        "PP" => "P".to_string(),
        "FF" => "F".to_string(),
        "SS" => "S".to_string(),
        "TT" => "T".to_string(),
        other => other.to_string(),
    }
}

fn namespace_name(folded_key: &str) -> String {
    match folded_key {
        "P" => "patches",
        "S" => "sprites",
        "F" => "flats",
        "TX" | "T" => "textures",
        "HI" => "hires",
        "C" => "colormaps",
        "A" => "acs",
        "V" => "voices",
        "VX" => "voxels",
        "DS" => "sounds",
        other => return other.to_ascii_lowercase(),
    }
    .to_string()
}

/// `Some((folded_key, is_start))` if `name` is a namespace marker.
fn parse_marker(name: &str) -> Option<(String, bool)> {
    let upper = name.to_ascii_uppercase();
    if let Some(prefix) = upper.strip_suffix("_START") {
        return Some((fold_marker_key(prefix), true));
    }
    if let Some(prefix) = upper.strip_suffix("_END") {
        return Some((fold_marker_key(prefix), false));
    }
    None
}

/// `true` if `entries` end with an unmatched `F_END` and never open an
/// `F_START`, the "flat hack" some early WADs rely on (flats begin
/// implicitly at the first lump).
fn is_flat_hack(entries: &[ArchiveEntry]) -> bool {
    let any_f_start = entries.iter().any(|e| matches!(parse_marker(&e.name()), Some((key, true)) if key == "F"));
    entries.last().is_some_and(|last| {
        parse_marker(&last.name()) == Some(("F".to_string(), false))
            && !any_f_start
            && entries.first().is_some_and(|e| e.size() > 0)
    })
}

/// Assigns a `namespace` ex-prop to every entry per the marker-range,
/// flat-hack, and ROTT rules.
pub(crate) fn update_namespaces(entries: &[ArchiveEntry]) {
    let mut stack: Vec<String> = Vec::new();
    let mut assigned: Vec<Option<String>> = vec![None; entries.len()];
    for (i, e) in entries.iter().enumerate() {
        if let Some((key, is_start)) = parse_marker(&e.name()) {
            if is_start {
                stack.push(key);
            } else if let Some(pos) = stack.iter().rposition(|k| k == &key) {
                stack.truncate(pos);
            }
        }
        assigned[i] = stack.last().cloned();
    }

    if is_flat_hack(entries) {
        for slot in assigned.iter_mut().take(entries.len() - 1) {
            *slot = Some("F".to_string());
        }
    }

    let is_rott = entries.len() > 2090
        && entries.first().is_some_and(|e| e.upper_name() == "WALLSTRT")
        && entries.len() >= 2
        && entries[entries.len() - 2].upper_name() == "TABLES";

    for (i, e) in entries.iter().enumerate() {
        let ns = if is_rott {
            "rott".to_string()
        } else {
            assigned[i].as_deref().map_or_else(|| "global".to_string(), namespace_name)
        };
        e.set_ex_prop("namespace", ns);
    }
}

pub(crate) fn detect_doom_style_maps(entries: &[ArchiveEntry]) -> Vec<MapDesc> {
    let mut maps = Vec::new();
    let mut i = 0usize;
    while i < entries.len() {
        let name = entries[i].upper_name();
        if name == "TEXTMAP" {
            if i == 0 {
                i += 1;
                continue;
            }
            let head = entries[i - 1].clone();
            let mut end_idx = i;
            while end_idx < entries.len() && entries[end_idx].upper_name() != "ENDMAP" {
                end_idx += 1;
            }
            if end_idx < entries.len() {
                maps.push(MapDesc {
                    name: head.name(),
                    head,
                    end: entries[end_idx].clone(),
                    format: MapFormat::Udmf,
                    nested_archive: false,
                });
                i = end_idx + 1;
                continue;
            }
            i += 1;
            continue;
        }

        let mut cidx = 0usize;
        let mut j = i;
        let mut seq_positions = Vec::new();
        loop {
            if j >= entries.len() {
                break;
            }
            let entry_name = entries[j].upper_name();
            if let Some(offset) = MAP_LUMP_ORDER[cidx..].iter().position(|c| *c == entry_name) {
                cidx += offset + 1;
                seq_positions.push(j);
                j += 1;
            } else {
                break;
            }
        }

        let present: HashSet<String> = seq_positions.iter().map(|&p| entries[p].upper_name()).collect();
        if !seq_positions.is_empty() && REQUIRED_MAP_LUMPS.iter().all(|r| present.contains(*r)) && i > 0 {
            let head = entries[i - 1].clone();
            let last_idx = *seq_positions.last().expect("non-empty");
            let format = if present.contains("BEHAVIOR") {
                MapFormat::Hexen
            } else if present.contains("LEAFS") && present.contains("LIGHTS") && present.contains("MACROS") {
                MapFormat::Doom64
            } else {
                MapFormat::Doom
            };
            maps.push(MapDesc {
                name: head.name(),
                head,
                end: entries[last_idx].clone(),
                format,
                nested_archive: false,
            });
            i = last_idx + 1;
            continue;
        }
        i += 1;
    }
    maps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::entry::ArchiveEntry;

    fn build_sample_wad() -> Vec<u8> {
        let lumps: &[(&str, &[u8])] = &[("MAP01", b""), ("THINGS", b"t"), ("LINEDEFS", b"l"), ("SIDEDEFS", b"s"), ("VERTEXES", b"v"), ("SECTORS", b"sec")];
        let mut out = Vec::new();
        out.extend_from_slice(b"PWAD");
        out.extend_from_slice(&(lumps.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        let mut records = Vec::new();
        for (name, data) in lumps {
            let offset = out.len() as u32;
            out.extend_from_slice(data);
            records.push((offset, data.len() as u32, *name));
        }
        let dir_offset = out.len() as u32;
        out[8..12].copy_from_slice(&dir_offset.to_le_bytes());
        for (offset, size, name) in records {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            let mut field = [0u8; 8];
            let bytes = name.as_bytes();
            field[..bytes.len()].copy_from_slice(bytes);
            out.extend_from_slice(&field);
        }
        out
    }

    #[test]
    fn is_wad_archive_validates_header_and_directory_bounds() {
        let bytes = build_sample_wad();
        assert!(is_wad_archive(&bytes));
        assert!(!is_wad_archive(&bytes[..8]));
        assert!(!is_wad_archive(b"XXXX\0\0\0\0\0\0\0\0"));
    }

    #[test]
    fn open_and_detect_doom_map() {
        let bytes = build_sample_wad();
        let archive = WadArchive::new();
        archive.open_bytes(&bytes).unwrap();
        assert_eq!(archive.base().num_entries(), 6);
        let maps = archive.detect_maps();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].name, "MAP01");
        assert_eq!(maps[0].format, MapFormat::Doom);
    }

    #[test]
    fn namespace_folding_applies_pp_ss_tt_and_letter_mapping() {
        let entries = vec![
            ArchiveEntry::new("PP_START", vec![]),
            ArchiveEntry::new("WALL1", vec![1]),
            ArchiveEntry::new("PP_END", vec![]),
        ];
        update_namespaces(&entries);
        assert_eq!(entries[1].ex_prop("namespace").unwrap().as_string(0), "patches");
    }

    #[test]
    fn flat_hack_opens_implicit_f_namespace_at_start() {
        let entries = vec![
            ArchiveEntry::new("FLAT1", vec![1]),
            ArchiveEntry::new("FLAT2", vec![1]),
            ArchiveEntry::new("F_END", vec![]),
        ];
        update_namespaces(&entries);
        assert_eq!(entries[0].ex_prop("namespace").unwrap().as_string(0), "flats");
        assert_eq!(entries[1].ex_prop("namespace").unwrap().as_string(0), "flats");
    }

    #[test]
    fn has_flat_hack_detects_missing_f_start() {
        let wad = WadArchive::new();
        wad.base().add_entry(None, ArchiveEntry::new("FLAT1", vec![1]), None).unwrap();
        wad.base().add_entry(None, ArchiveEntry::new("F_END", vec![]), None).unwrap();
        assert!(wad.has_flat_hack());

        let wad2 = WadArchive::new();
        wad2.base().add_entry(None, ArchiveEntry::new("F_START", vec![]), None).unwrap();
        wad2.base().add_entry(None, ArchiveEntry::new("FLAT1", vec![1]), None).unwrap();
        wad2.base().add_entry(None, ArchiveEntry::new("F_END", vec![]), None).unwrap();
        assert!(!wad2.has_flat_hack());
    }

    #[test]
    fn detect_includes_finds_quoted_path() {
        let text = "#include \"zcommon.acs\"\nscript 1 open {}\n";
        assert_eq!(detect_includes(text), vec!["zcommon.acs".to_string()]);
    }

    #[test]
    fn write_round_trips_iwad_flag_and_lump_order() {
        let archive = WadArchive::new();
        archive.base().add_entry(None, ArchiveEntry::new("A", b"1".to_vec()), None).unwrap();
        archive.base().add_entry(None, ArchiveEntry::new("B", b"22".to_vec()), None).unwrap();
        let bytes = archive.write_bytes().unwrap();
        assert!(is_wad_archive(&bytes));
        let reopened = WadArchive::new();
        reopened.open_bytes(&bytes).unwrap();
        let names: Vec<_> = reopened.base().entry_tree_as_list().iter().map(ArchiveEntry::name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
