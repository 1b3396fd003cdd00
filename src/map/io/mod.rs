//! Glues a detected [`MapDesc`]'s lump range to the per-format binary/text
//! codecs: `read_map` builds a `SladeMap` from archive entries, `write_map`
//! produces entries back (§3's detectMaps → readMap → … → writeMap flow).

pub mod convert;
pub mod doom;
pub mod doom64;
pub mod hexen;
pub mod udmf;

use crate::archive::base::{Archive, MapDesc};
use crate::archive::entry::ArchiveEntry;
use crate::errors::{MapError, SladeError};
use crate::map::store::SladeMap;
use crate::map::MapFormat;
use crate::services::{ResourceManager, TextParser};

const TEXTMAP: &str = "TEXTMAP";
const ENDMAP: &str = "ENDMAP";

/// Lump names a map's own data can start with. A WAD-style `MapDesc.head`
/// is the marker lump *before* these (excluded from the body); a PK3
/// per-map folder has no marker, so its `head` is already the first data
/// lump and must be included.
const DATA_LUMP_NAMES: &[&str] = &[
    "TEXTMAP", "THINGS", "LINEDEFS", "SIDEDEFS", "VERTEXES", "SEGS", "SSECTORS", "NODES", "SECTORS", "REJECT",
    "BLOCKMAP", "BEHAVIOR", "SCRIPTS", "LEAFS", "LIGHTS", "MACROS",
];

fn lumps_between(list: &[ArchiveEntry], desc: &MapDesc) -> Result<Vec<ArchiveEntry>, SladeError> {
    let start = list
        .iter()
        .position(|e| e.ptr_eq(&desc.head))
        .ok_or_else(|| MapError::InvalidFormat(format!("map '{}' head entry not found in archive", desc.name)))?;
    let finish = list
        .iter()
        .position(|e| e.ptr_eq(&desc.end))
        .ok_or_else(|| MapError::InvalidFormat(format!("map '{}' end entry not found in archive", desc.name)))?;
    if finish < start {
        return Err(MapError::InvalidFormat(format!("map '{}' end precedes its head", desc.name)).into());
    }
    let body_start = if DATA_LUMP_NAMES.contains(&desc.head.upper_name().as_str()) { start } else { start + 1 };
    Ok(list[body_start..=finish].to_vec())
}

/// Reads the lumps described by `desc` out of `archive` into a fresh
/// `SladeMap`. Doom64 sidedef textures are resolved through `resources`;
/// UDMF `TEXTMAP` bodies are parsed with `parser`. Non-`TEXTMAP`/`ENDMAP`
/// lumps inside a UDMF map's range are retained verbatim in
/// `SladeMap::udmf_extra_entries` for pass-through on save.
///
/// # Errors
/// Returns an error if `desc`'s head/end entries cannot be located in
/// `archive`, a required lump fails to decode, or (for UDMF) the parser
/// rejects the `TEXTMAP` body.
pub fn read_map(
    archive: &dyn Archive,
    desc: &MapDesc,
    resources: &dyn ResourceManager,
    parser: &dyn TextParser,
) -> Result<SladeMap, SladeError> {
    if desc.nested_archive {
        return Ok(SladeMap::new(desc.format));
    }

    let list = archive.base().entry_tree_as_list();
    let body = lumps_between(&list, desc)?;
    let mut map = SladeMap::new(desc.format);

    if desc.format == MapFormat::Udmf {
        let textmap = body
            .iter()
            .find(|e| e.upper_name() == TEXTMAP)
            .ok_or_else(|| MapError::InvalidFormat(format!("map '{}' has no TEXTMAP lump", desc.name)))?;
        let bytes = archive.load_entry_data(textmap)?;
        let text = String::from_utf8_lossy(&bytes);
        udmf::read_text(&mut map, &text, parser)?;
        for entry in &body {
            let name = entry.upper_name();
            if name == TEXTMAP || name == ENDMAP {
                continue;
            }
            let data = archive.load_entry_data(entry)?;
            map.udmf_extra_entries.push((entry.name(), data));
        }
        return Ok(map);
    }

    let lump = |name: &str| -> Result<Vec<u8>, SladeError> {
        match body.iter().find(|e| e.upper_name() == name) {
            Some(e) => Ok(archive.load_entry_data(e)?),
            None => Ok(Vec::new()),
        }
    };

    match desc.format {
        MapFormat::Doom => {
            doom::read_vertexes(&mut map, &lump("VERTEXES")?)?;
            doom::read_sectors(&mut map, &lump("SECTORS")?)?;
            doom::read_sidedefs(&mut map, &lump("SIDEDEFS")?)?;
            doom::read_linedefs(&mut map, &lump("LINEDEFS")?)?;
            doom::read_things(&mut map, &lump("THINGS")?)?;
        }
        MapFormat::Hexen => {
            hexen::read_vertexes(&mut map, &lump("VERTEXES")?)?;
            hexen::read_sectors(&mut map, &lump("SECTORS")?)?;
            hexen::read_sidedefs(&mut map, &lump("SIDEDEFS")?)?;
            hexen::read_linedefs(&mut map, &lump("LINEDEFS")?)?;
            hexen::read_things(&mut map, &lump("THINGS")?)?;
            convert::convert_hexen_specials(&mut map);
        }
        MapFormat::Doom64 => {
            doom64::read_vertexes(&mut map, &lump("VERTEXES")?)?;
            doom64::read_sectors(&mut map, &lump("SECTORS")?)?;
            doom64::read_sidedefs(&mut map, &lump("SIDEDEFS")?, resources)?;
            doom64::read_linedefs(&mut map, &lump("LINEDEFS")?)?;
            doom64::read_things(&mut map, &lump("THINGS")?)?;
        }
        MapFormat::Udmf => unreachable!("handled above"),
    }
    Ok(map)
}

/// Serializes `map` back to the lump sequence its format expects: names
/// and order a WAD directory (or a UDMF lump range) lays them out in.
///
/// Nodebuilder-derived lumps (`SEGS`/`SSECTORS`/`NODES`/`REJECT`/
/// `BLOCKMAP`) are not regenerated here; rebuilding the BSP is a separate
/// concern this core does not own, matching the original editor's split
/// between map data editing and the external nodebuilder it shells out to.
#[must_use]
pub fn write_map(map: &SladeMap, resources: &dyn ResourceManager) -> Vec<(String, Vec<u8>)> {
    match map.current_format {
        MapFormat::Udmf => {
            let mut out = vec![(TEXTMAP.to_string(), udmf::write_text(map).into_bytes())];
            out.extend(map.udmf_extra_entries.iter().cloned());
            out.push((ENDMAP.to_string(), Vec::new()));
            out
        }
        MapFormat::Doom => vec![
            ("THINGS".to_string(), doom::write_things(map)),
            ("LINEDEFS".to_string(), doom::write_linedefs(map)),
            ("SIDEDEFS".to_string(), doom::write_sidedefs(map)),
            ("VERTEXES".to_string(), doom::write_vertexes(map)),
            ("SECTORS".to_string(), doom::write_sectors(map)),
        ],
        MapFormat::Hexen => vec![
            ("THINGS".to_string(), hexen::write_things(map)),
            ("LINEDEFS".to_string(), hexen::write_linedefs(map)),
            ("SIDEDEFS".to_string(), hexen::write_sidedefs(map)),
            ("VERTEXES".to_string(), hexen::write_vertexes(map)),
            ("SECTORS".to_string(), hexen::write_sectors(map)),
        ],
        MapFormat::Doom64 => vec![
            ("THINGS".to_string(), doom64::write_things(map)),
            ("LINEDEFS".to_string(), doom64::write_linedefs(map)),
            ("SIDEDEFS".to_string(), doom64::write_sidedefs(map, resources)),
            ("VERTEXES".to_string(), doom64::write_vertexes(map)),
            ("SECTORS".to_string(), doom64::write_sectors(map)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::base::{Archive, ArchiveBase, ArchiveFormatId};
    use crate::archive::wad::detect_doom_style_maps;
    use crate::errors::ArchiveResult;
    use crate::services::{TableResourceManager, UdmfTextParser};

    struct StubArchive {
        base: ArchiveBase,
    }

    impl Archive for StubArchive {
        fn base(&self) -> &ArchiveBase {
            &self.base
        }
        fn open_bytes(&self, _bytes: &[u8]) -> ArchiveResult<()> {
            Ok(())
        }
        fn write_bytes(&self) -> ArchiveResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn push(base: &ArchiveBase, name: &str, data: Vec<u8>) {
        base.add_entry(None, ArchiveEntry::new(name, data), None).unwrap();
    }

    #[test]
    fn read_map_round_trips_a_doom_format_map() {
        let mut source = SladeMap::new(MapFormat::Doom);
        let v1 = source.add_vertex(0.0, 0.0);
        let v2 = source.add_vertex(64.0, 0.0);
        source.add_line(v1, v2);
        source.add_sector("FLOOR0_1", "CEIL3_5");
        source.add_thing(32.0, 32.0, 1);

        let resources = TableResourceManager::new();
        let lumps = write_map(&source, &resources);

        let archive = StubArchive { base: ArchiveBase::new(ArchiveFormatId::Wad) };
        push(&archive.base, "MAP01", vec![]);
        for (name, data) in lumps {
            push(&archive.base, &name, data);
        }

        let list = archive.base().entry_tree_as_list();
        let descs = detect_doom_style_maps(&list);
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].format, MapFormat::Doom);

        let parser = UdmfTextParser;
        let reread = read_map(&archive, &descs[0], &resources, &parser).unwrap();
        assert_eq!(reread.vertices.len(), 2);
        assert_eq!(reread.lines.len(), 1);
        assert_eq!(reread.sectors.len(), 1);
        assert_eq!(reread.things.len(), 1);
    }

    #[test]
    fn read_map_parses_udmf_and_preserves_extra_lumps() {
        let archive = StubArchive { base: ArchiveBase::new(ArchiveFormatId::Zip) };
        push(&archive.base, "MAP01", vec![]);
        push(
            &archive.base,
            "TEXTMAP",
            br#"namespace="doom"; vertex { x = 0.0; y = 0.0; }"#.to_vec(),
        );
        push(&archive.base, "ZNODES", vec![1, 2, 3]);
        push(&archive.base, "ENDMAP", vec![]);

        let list = archive.base().entry_tree_as_list();
        let desc = MapDesc {
            name: "MAP01".to_string(),
            head: list[0].clone(),
            end: list[3].clone(),
            format: MapFormat::Udmf,
            nested_archive: false,
        };

        let resources = TableResourceManager::new();
        let parser = UdmfTextParser;
        let map = read_map(&archive, &desc, &resources, &parser).unwrap();
        assert_eq!(map.vertices.len(), 1);
        assert_eq!(map.udmf_extra_entries, vec![("ZNODES".to_string(), vec![1, 2, 3])]);

        let lumps = write_map(&map, &resources);
        assert_eq!(lumps[0].0, "TEXTMAP");
        assert_eq!(lumps[1], ("ZNODES".to_string(), vec![1, 2, 3]));
        assert_eq!(lumps[2].0, "ENDMAP");
    }
}
