//! Binary Hexen-format map reader/writer: Doom's linedef layout plus a
//! 5-byte args block and thing tid/z/special/args.

use crate::errors::{MapError, MapResult};
use crate::map::io::doom::{self, round_coord};
use crate::map::object::MapObject;
use crate::map::store::SladeMap;
use crate::map::MapFormat;
use crate::memchunk::MemChunk;

pub const LINEDEF_SIZE: usize = 16;
pub const THING_SIZE: usize = 20;

const NONE_SIDE: u16 = 0xFFFF;

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
        let mut args = [0i32; 5];
        for a in &mut args {
            *a = i32::from(mc.read(1).map_err(|e| MapError::InvalidFormat(e.to_string()))?[0]);
        }
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
        line.args = args;
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
        let tid = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let x = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let y = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let z = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let angle = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let ttype = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let flags = mc.read_i16_le().map_err(|e| MapError::InvalidFormat(e.to_string()))?;
        let special = mc.read(1).map_err(|e| MapError::InvalidFormat(e.to_string()))?[0];
        let mut args = [0i32; 5];
        for a in &mut args {
            *a = i32::from(mc.read(1).map_err(|e| MapError::InvalidFormat(e.to_string()))?[0]);
        }
        let id = map.add_thing(f64::from(x), f64::from(y), i32::from(ttype));
        let thing = map.thing_mut(id).expect("just created");
        thing.tid = i32::from(tid);
        thing.angle = i32::from(angle);
        thing.special = i32::from(special);
        thing.args = args;
        thing.set_prop("z", i32::from(z));
        thing.set_prop("flags", i32::from(flags));
    }
    Ok(())
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
        for &arg in &line.args {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            mc.write(&[arg as u8]);
        }
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
        #[allow(clippy::cast_possible_truncation)]
        mc.write_i16_le(t.tid as i16);
        mc.write_i16_le(round_coord(t.x));
        mc.write_i16_le(round_coord(t.y));
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
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        mc.write(&[t.special as u8]);
        for &arg in &t.args {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            mc.write(&[arg as u8]);
        }
    }
    mc.data().to_vec()
}

/// Vertices and sectors share Doom's layout; Hexen reuses those readers.
pub use doom::{read_sectors, read_sidedefs, read_vertexes, write_sectors, write_sidedefs, write_vertexes};

pub const fn format() -> MapFormat {
    MapFormat::Hexen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFormat as Fmt;

    #[test]
    fn linedef_round_trip_preserves_args_and_special() {
        let mut map = SladeMap::new(Fmt::Hexen);
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(32.0, 0.0);
        let id = map.add_line(v1, v2);
        {
            let line = map.line_mut(id).unwrap();
            line.special = 121;
            line.args = [5, 2, 0, 3, 0];
        }
        let bytes = write_linedefs(&map);

        let mut reread = SladeMap::new(Fmt::Hexen);
        reread.add_vertex(0.0, 0.0);
        reread.add_vertex(32.0, 0.0);
        read_linedefs(&mut reread, &bytes).unwrap();
        assert_eq!(reread.lines[0].special, 121);
        assert_eq!(reread.lines[0].args, [5, 2, 0, 3, 0]);
    }

    #[test]
    fn thing_round_trip_preserves_tid_and_args() {
        let mut map = SladeMap::new(Fmt::Hexen);
        let id = map.add_thing(10.0, -20.0, 14);
        {
            let t = map.thing_mut(id).unwrap();
            t.tid = 7;
            t.args = [1, 0, 0, 0, 0];
        }
        let bytes = write_things(&map);
        let mut reread = SladeMap::new(Fmt::Hexen);
        read_things(&mut reread, &bytes).unwrap();
        assert_eq!(reread.things[0].tid, 7);
        assert_eq!(reread.things[0].args[0], 1);
    }
}
