//! Binary Doom-format map reader/writer: fixed-size vertex/linedef/sidedef/
//! sector/thing structs, 1:1.

use crate::errors::{MapError, MapResult};
use crate::map::object::MapObject;
use crate::map::store::SladeMap;
use crate::map::MapFormat;
use crate::memchunk::MemChunk;

pub const VERTEX_SIZE: usize = 4;
pub const LINEDEF_SIZE: usize = 14;
pub const SIDEDEF_SIZE: usize = 30;
pub const SECTOR_SIZE: usize = 26;
pub const THING_SIZE: usize = 10;

const NONE_SIDE: u16 = 0xFFFF;

pub fn read_vertexes(map: &mut SladeMap, data: &[u8]) -> MapResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut mc = MemChunk::from_vec(data.to_vec());
    let count = data.len() / VERTEX_SIZE;
    for _ in 0..count {
        let x = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let y = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        map.add_vertex(f64::from(x), f64::from(y));
    }
    Ok(())
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
        let light = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let special = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let tag = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let id = map.add_sector(f_tex, c_tex);
        let sector = map.sector_mut(id).expect("just created");
        sector.floor.height = f64::from(f_h);
        sector.ceiling.height = f64::from(c_h);
        sector.light = i32::from(light);
        sector.special = i32::from(special);
        sector.id = i32::from(tag);
    }
    Ok(())
}

pub fn read_sidedefs(map: &mut SladeMap, data: &[u8]) -> MapResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut mc = MemChunk::from_vec(data.to_vec());
    let count = data.len() / SIDEDEF_SIZE;
    for _ in 0..count {
        let xoff = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let yoff = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let upper = mc.read_name(8).map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let lower = mc.read_name(8).map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let middle = mc.read_name(8).map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let sector_idx = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let sector_id = sector_obj_id(map, sector_idx)?;
        let id = map.add_side(sector_id);
        let side = map.side_mut(id).expect("just created");
        side.offset_x = i32::from(xoff);
        side.offset_y = i32::from(yoff);
        side.tex_upper = upper;
        side.tex_lower = lower;
        side.tex_middle = middle;
    }
    Ok(())
}

fn sector_obj_id(map: &SladeMap, index: i16) -> MapResult<u32> {
    if index < 0 || index as usize >= map.sectors.len() {
        return Err(MapError::InvalidFormat(format!("sidedef references out-of-range sector {index}")));
    }
    Ok(map.sectors[index as usize].obj_id())
}

fn vertex_obj_id(map: &SladeMap, index: i16) -> MapResult<u32> {
    if index < 0 || index as usize >= map.vertices.len() {
        return Err(MapError::InvalidFormat(format!("linedef references out-of-range vertex {index}")));
    }
    Ok(map.vertices[index as usize].obj_id())
}

fn side_obj_id(map: &SladeMap, raw: u16) -> Option<u32> {
    if raw == NONE_SIDE {
        return None;
    }
    map.sides.get(raw as usize).map(MapObject::obj_id)
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
        let special = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let tag = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let s1_raw = mc.read_u16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let s2_raw = mc.read_u16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;

        let v1_id = vertex_obj_id(map, v1)?;
        let v2_id = vertex_obj_id(map, v2)?;
        let id = map.add_line(v1_id, v2_id);
        let side1 = side_obj_id(map, s1_raw);
        let side2 = side_obj_id(map, s2_raw);
        let line = map.line_mut(id).expect("just created");
        line.flags = i32::from(flags);
        line.special = i32::from(special);
        line.line_id = i32::from(tag);
        line.side1 = side1;
        line.side2 = side2;
    }
    Ok(())
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
        let angle = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let ttype = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let flags = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let id = map.add_thing(f64::from(x), f64::from(y), i32::from(ttype));
        let thing = map.thing_mut(id).expect("just created");
        thing.angle = i32::from(angle);
        thing.set_prop("flags", i32::from(flags));
    }
    Ok(())
}

pub fn write_vertexes(map: &SladeMap) -> Vec<u8> {
    let mut mc = MemChunk::new();
    for v in &map.vertices {
        mc.write_i16_le(round_coord(v.x));
        mc.write_i16_le(round_coord(v.y));
    }
    mc.data().to_vec()
}

pub fn write_sectors(map: &SladeMap) -> Vec<u8> {
    let mut mc = MemChunk::new();
    for s in &map.sectors {
        mc.write_i16_le(round_coord(s.floor.height));
        mc.write_i16_le(round_coord(s.ceiling.height));
        mc.write_name(&s.floor.texture, 8);
        mc.write_name(&s.ceiling.texture, 8);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(s.light as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(s.special as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(s.id as i16);
    }
    mc.data().to_vec()
}

pub fn write_sidedefs(map: &SladeMap) -> Vec<u8> {
    let sector_index: std::collections::HashMap<u32, usize> =
        map.sectors.iter().enumerate().map(|(i, s)| (s.obj_id(), i)).collect();
    let mut mc = MemChunk::new();
    for side in &map.sides {
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(side.offset_x as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(side.offset_y as i16);
        mc.write_name(&side.tex_upper, 8);
        mc.write_name(&side.tex_lower, 8);
        mc.write_name(&side.tex_middle, 8);
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let sector_idx = sector_index.get(&side.sector).copied().unwrap_or(0) as i16;
        mc.write_i16_le(sector_idx);
    }
    mc.data().to_vec()
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
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(line.special as i16);
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

pub fn write_things(map: &SladeMap) -> Vec<u8> {
    let mut mc = MemChunk::new();
    for t in &map.things {
        mc.write_i16_le(round_coord(t.x));
        mc.write_i16_le(round_coord(t.y));
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.angle as i16);
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.thing_type as i16);
        #[allow(clippy::cast_possible_truncation)]
        let flags = t.prop("flags").map(crate::property::Property::as_int).unwrap_or(0) as i16;
        mc.write_i16_le(flags);
    }
    mc.data().to_vec()
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn round_coord(v: f64) -> i16 {
    v.round() as i16
}

pub const fn format() -> MapFormat {
    MapFormat::Doom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFormat as Fmt;

    fn sample_map() -> SladeMap {
        let mut map = SladeMap::new(Fmt::Doom);
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(64.0, 0.0);
        let sector = map.add_sector("FLOOR4_8", "CEIL3_5");
        let side = map.add_side(sector);
        let id = map.add_line(v1, v2);
        map.line_mut(id).unwrap().side1 = Some(side);
        map.add_thing(10.0, 10.0, 1);
        map
    }

    #[test]
    fn vertex_round_trip_preserves_coordinates() {
        let map = sample_map();
        let bytes = write_vertexes(&map);
        let mut reread = SladeMap::new(Fmt::Doom);
        read_vertexes(&mut reread, &bytes).unwrap();
        assert_eq!(reread.vertices.len(), 2);
        assert_eq!(reread.vertices[1].x, 64.0);
    }

    #[test]
    fn linedef_round_trip_preserves_side_and_vertex_links() {
        let map = sample_map();
        let v_bytes = write_vertexes(&map);
        let s_bytes = write_sectors(&map);
        let sd_bytes = write_sidedefs(&map);
        let l_bytes = write_linedefs(&map);

        let mut reread = SladeMap::new(Fmt::Doom);
        read_vertexes(&mut reread, &v_bytes).unwrap();
        read_sectors(&mut reread, &s_bytes).unwrap();
        read_sidedefs(&mut reread, &sd_bytes).unwrap();
        read_linedefs(&mut reread, &l_bytes).unwrap();

        assert_eq!(reread.lines.len(), 1);
        assert!(reread.lines[0].side1.is_some());
        assert!(reread.lines[0].side2.is_none());
    }

    #[test]
    fn empty_lump_produces_no_objects() {
        let mut map = SladeMap::new(Fmt::Doom);
        read_vertexes(&mut map, &[]).unwrap();
        assert!(map.vertices.is_empty());
    }
}
