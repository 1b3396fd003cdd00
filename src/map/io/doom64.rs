//! Binary Doom 64-format map reader/writer: fixed-point vertices, hashed
//! sidedef/sector textures resolved via an injected [`ResourceManager`],
//! and the macro/extraflags-packed linedef type.

use crate::errors::{MapError, MapResult};
use crate::map::object::MapObject;
use crate::map::store::SladeMap;
use crate::map::MapFormat;
use crate::memchunk::MemChunk;
use crate::services::ResourceManager;

pub const VERTEX_SIZE: usize = 8;
pub const LINEDEF_SIZE: usize = 16;
pub const SIDEDEF_SIZE: usize = 12;
pub const SECTOR_SIZE: usize = 32;
pub const THING_SIZE: usize = 14;

const NONE_SIDE: u16 = 0xFFFF;
const MACRO_FLAG: i32 = 0x100;

pub fn read_vertexes(map: &mut SladeMap, data: &[u8]) -> MapResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut mc = MemChunk::from_vec(data.to_vec());
    let count = data.len() / VERTEX_SIZE;
    for _ in 0..count {
        let x = mc.read_i32_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let y = mc.read_i32_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        map.add_vertex(f64::from(x) / 65536.0, f64::from(y) / 65536.0);
    }
    Ok(())
}

pub fn write_vertexes(map: &SladeMap) -> Vec<u8> {
    let mut mc = MemChunk::new();
    for v in &map.vertices {
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i32_le((v.x * 65536.0).round() as i32);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i32_le((v.y * 65536.0).round() as i32);
    }
    mc.data().to_vec()
}

pub fn read_sectors(map: &mut SladeMap, data: &[u8]) -> MapResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut mc = MemChunk::from_vec(data.to_vec());
    let count = data.len() / SECTOR_SIZE;
    for _ in 0..count {
        let f_h = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let c_h = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let f_tex = mc.read_name(8).map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let c_tex = mc.read_name(8).map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let colors: Vec<i16> = (0..5)
            .map(|_| mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string())))
            .collect::<MapResult<_>>()?;
        let special = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let tag = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let flags = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;

        let id = map.add_sector(f_tex, c_tex);
        let sector = map.sector_mut(id).expect("just created");
        sector.floor.height = f64::from(f_h);
        sector.ceiling.height = f64::from(c_h);
        sector.special = i32::from(special);
        sector.id = i32::from(tag);
        for (i, c) in colors.into_iter().enumerate() {
            sector.set_prop(&format!("color{i}"), i32::from(c));
        }
        sector.set_prop("flags", i32::from(flags));
    }
    Ok(())
}

pub fn write_sectors(map: &SladeMap) -> Vec<u8> {
    let mut mc = MemChunk::new();
    for s in &map.sectors {
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(s.floor.height as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(s.ceiling.height as i16);
        mc.write_name(&s.floor.texture, 8);
        mc.write_name(&s.ceiling.texture, 8);
        for i in 0..5 {
            let c = s.prop(&format!("color{i}")).map(crate::property::Property::as_int).unwrap_or(0);
            #[allow(clippy::cast_possible_truncation)]
            mc.write_i16_le(c as i16);
        }
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(s.special as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(s.id as i16);
        let flags = s.prop("flags").map(crate::property::Property::as_int).unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(flags as i16);
    }
    mc.data().to_vec()
}

pub fn read_sidedefs(map: &mut SladeMap, data: &[u8], resources: &dyn ResourceManager) -> MapResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut mc = MemChunk::from_vec(data.to_vec());
    let count = data.len() / SIDEDEF_SIZE;
    for _ in 0..count {
        let xoff = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let yoff = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let upper_hash = mc.read_u16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let lower_hash = mc.read_u16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let middle_hash = mc.read_u16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let sector_idx = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;

        if sector_idx < 0 || sector_idx as usize >= map.sectors.len() {
            return Err(MapError::InvalidFormat(format!("sidedef references out-of-range sector {sector_idx}")));
        }
        let sector_id = map.sectors[sector_idx as usize].obj_id();
        let id = map.add_side(sector_id);
        let side = map.side_mut(id).expect("just created");
        side.offset_x = i32::from(xoff);
        side.offset_y = i32::from(yoff);
        side.tex_upper = hash_to_name(resources, upper_hash);
        side.tex_lower = hash_to_name(resources, lower_hash);
        side.tex_middle = hash_to_name(resources, middle_hash);
    }
    Ok(())
}

fn hash_to_name(resources: &dyn ResourceManager, hash: u16) -> String {
    resources.texture_name_for_hash(hash).map_or_else(|| "-".to_string(), ToString::to_string)
}

pub fn write_sidedefs(map: &SladeMap, resources: &dyn ResourceManager) -> Vec<u8> {
    let sector_index: std::collections::HashMap<u32, usize> =
        map.sectors.iter().enumerate().map(|(i, s)| (s.obj_id(), i)).collect();
    let mut mc = MemChunk::new();
    for side in &map.sides {
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(side.offset_x as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(side.offset_y as i16);
        mc.write(&resources.hash_for_texture_name(&side.tex_upper).unwrap_or(0).to_le_bytes());
        mc.write(&resources.hash_for_texture_name(&side.tex_lower).unwrap_or(0).to_le_bytes());
        mc.write(&resources.hash_for_texture_name(&side.tex_middle).unwrap_or(0).to_le_bytes());
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let sector_idx = sector_index.get(&side.sector).copied().unwrap_or(0) as i16;
        mc.write_i16_le(sector_idx);
    }
    mc.data().to_vec()
}

pub fn read_linedefs(map: &mut SladeMap, data: &[u8]) -> MapResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut mc = MemChunk::from_vec(data.to_vec());
    let count = data.len() / LINEDEF_SIZE;
    for _ in 0..count {
        let v1 = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let v2 = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let flags = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let packed_type = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let tag = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let s1_raw = mc.read_u16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let s2_raw = mc.read_u16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;

        if v1 < 0 || v1 as usize >= map.vertices.len() || v2 < 0 || v2 as usize >= map.vertices.len() {
            return Err(MapError::InvalidFormat("linedef references out-of-range vertex".to_string()));
        }
        let v1_id = map.vertices[v1 as usize].obj_id();
        let v2_id = map.vertices[v2 as usize].obj_id();
        let id = map.add_line(v1_id, v2_id);

        let side1 = (s1_raw != NONE_SIDE).then(|| map.sides.get(s1_raw as usize).map(MapObject::obj_id)).flatten();
        let side2 = (s2_raw != NONE_SIDE).then(|| map.sides.get(s2_raw as usize).map(MapObject::obj_id)).flatten();

        let raw = i32::from(packed_type);
        let is_macro = raw & MACRO_FLAG != 0;
        let special = raw & 0xFF;
        let extraflags = (raw >> 9) & 0x7F;

        let line = map.line_mut(id).expect("just created");
        line.flags = i32::from(flags);
        line.special = special;
        line.line_id = i32::from(tag);
        line.side1 = side1;
        line.side2 = side2;
        line.set_prop("macro", is_macro);
        line.set_prop("extraflags", extraflags);
    }
    Ok(())
}

pub fn write_linedefs(map: &SladeMap) -> Vec<u8> {
    let vertex_index: std::collections::HashMap<u32, usize> =
        map.vertices.iter().enumerate().map(|(i, v)| (v.obj_id(), i)).collect();
    let side_index: std::collections::HashMap<u32, usize> =
        map.sides.iter().enumerate().map(|(i, s)| (s.obj_id(), i)).collect();
    let mut mc = MemChunk::new();
    for line in &map.lines {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        mc.write_i16_le(vertex_index.get(&line.v1).copied().unwrap_or(0) as i16);
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        mc.write_i16_le(vertex_index.get(&line.v2).copied().unwrap_or(0) as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(line.flags as i16);

        let is_macro = line.prop("macro").map(crate::property::Property::as_bool).unwrap_or(false);
        let extraflags = line.prop("extraflags").map(crate::property::Property::as_int).unwrap_or(0);
        let packed = (line.special & 0xFF) | ((extraflags & 0x7F) << 9) | if is_macro { MACRO_FLAG } else { 0 };
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(packed as i16);

        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(line.line_id as i16);
        let s1 = line.side1.and_then(|id| side_index.get(&id).copied());
        let s2 = line.side2.and_then(|id| side_index.get(&id).copied());
        #[allow(clippy::cast_possible_truncation)]
        mc.write(&s1.map_or(NONE_SIDE, |i| i as u16).to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        mc.write(&s2.map_or(NONE_SIDE, |i| i as u16).to_le_bytes());
    }
    mc.data().to_vec()
}

pub fn read_things(map: &mut SladeMap, data: &[u8]) -> MapResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut mc = MemChunk::from_vec(data.to_vec());
    let count = data.len() / THING_SIZE;
    for _ in 0..count {
        let x = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let y = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let z = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let angle = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let ttype = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let flags = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let tid = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;

        let id = map.add_thing(f64::from(x), f64::from(y), i32::from(ttype));
        let thing = map.thing_mut(id).expect("just created");
        thing.angle = i32::from(angle);
        thing.tid = i32::from(tid);
        thing.set_prop("z", i32::from(z));
        thing.set_prop("flags", i32::from(flags));
    }
    Ok(())
}

pub fn write_things(map: &SladeMap) -> Vec<u8> {
    let mut mc = MemChunk::new();
    for t in &map.things {
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.x as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.y as i16);
        let z = t.prop("z").map(crate::property::Property::as_int).unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(z as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.angle as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.thing_type as i16);
        let flags = t.prop("flags").map(crate::property::Property::as_int).unwrap_or(0);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(flags as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.tid as i16);
    }
    mc.data().to_vec()
}

pub const fn format() -> MapFormat {
    MapFormat::Doom64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFormat as Fmt;
    use crate::services::TableResourceManager;

    #[test]
    fn vertex_round_trip_handles_fixed_point() {
        let mut map = SladeMap::new(Fmt::Doom64);
        map.add_vertex(12.5, -3.25);
        let bytes = write_vertexes(&map);
        let mut reread = SladeMap::new(Fmt::Doom64);
        read_vertexes(&mut reread, &bytes).unwrap();
        assert!((reread.vertices[0].x - 12.5).abs() < 1e-6);
        assert!((reread.vertices[0].y - (-3.25)).abs() < 1e-6);
    }

    #[test]
    fn linedef_packed_type_round_trips_macro_and_extraflags() {
        let mut map = SladeMap::new(Fmt::Doom64);
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(1.0, 0.0);
        let id = map.add_line(v1, v2);
        {
            let line = map.line_mut(id).unwrap();
            line.special = 42;
            line.set_prop("macro", true);
            line.set_prop("extraflags", 5);
        }
        let bytes = write_linedefs(&map);
        let mut reread = SladeMap::new(Fmt::Doom64);
        reread.add_vertex(0.0, 0.0);
        reread.add_vertex(1.0, 0.0);
        read_linedefs(&mut reread, &bytes).unwrap();
        let line = &reread.lines[0];
        assert_eq!(line.special, 42);
        assert!(line.prop("macro").unwrap().as_bool());
        assert_eq!(line.prop("extraflags").unwrap().as_int(), 5);
    }

    #[test]
    fn sidedef_texture_hash_resolves_through_resource_manager() {
        let mut rm = TableResourceManager::new();
        rm.insert(99, "ROCKRED1");
        let mut map = SladeMap::new(Fmt::Doom64);
        map.add_sector("FLOOR", "CEIL");
        let mut mc = MemChunk::new();
        mc.write_i16_le(0);
        mc.write_i16_le(0);
        mc.write(&99u16.to_le_bytes());
        mc.write(&0u16.to_le_bytes());
        mc.write(&0u16.to_le_bytes());
        mc.write_i16_le(0);
        read_sidedefs(&mut map, mc.data(), &rm).unwrap();
        assert_eq!(map.sides[0].tex_upper, "ROCKRED1");
    }
}
