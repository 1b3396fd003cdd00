//! Hexen → UDMF conversion: action specials that double as tag/flag
//! carriers get their args folded into UDMF `id`/boolean properties and
//! cleared, matching what a Hexen-aware UDMF writer must reproduce so the
//! resulting namespace plays back identically in a Hexen-format port.

use crate::map::store::SladeMap;

const FLAG_ZONEBOUNDARY: i32 = 1;
const FLAG_JUMPOVER: i32 = 2;
const FLAG_BLOCKFLOATERS: i32 = 4;
const FLAG_CLIPMIDTEX: i32 = 8;
const FLAG_WRAPMIDTEX: i32 = 16;
const FLAG_MIDTEX3D: i32 = 32;
const FLAG_CHECKSWITCHRANGE: i32 = 64;

fn apply_flag_props(line: &mut crate::map::line::Line, flags: i32) {
    line.set_prop("zoneboundary", flags & FLAG_ZONEBOUNDARY != 0);
    line.set_prop("jumpover", flags & FLAG_JUMPOVER != 0);
    line.set_prop("blockfloaters", flags & FLAG_BLOCKFLOATERS != 0);
    line.set_prop("clipmidtex", flags & FLAG_CLIPMIDTEX != 0);
    line.set_prop("wrapmidtex", flags & FLAG_WRAPMIDTEX != 0);
    line.set_prop("midtex3d", flags & FLAG_MIDTEX3D != 0);
    line.set_prop("checkswitchrange", flags & FLAG_CHECKSWITCHRANGE != 0);
}

/// Applies the Hexen→UDMF special/arg/id conversion rules in place, for
/// every line in `map`. Idempotent only in the sense that already-zeroed
/// args convert to `id = 0`; callers should run this exactly once per
/// Hexen-origin map, immediately after the binary reader populates it.
pub fn convert_hexen_specials(map: &mut SladeMap) {
    let line_ids: Vec<_> = map.lines.iter().map(crate::map::object::MapObject::obj_id).collect();
    for id in line_ids {
        let Some(line) = map.line_mut(id) else { continue };
        match line.special {
            1 => {
                line.line_id = line.args[3];
                line.args[3] = 0;
            }
            5 => {
                line.line_id = line.args[4];
                line.args[4] = 0;
            }
            121 => {
                line.line_id = (line.args[4] << 8) + line.args[0];
                let flags = line.args[1];
                line.special = 0;
                line.args = [0; 5];
                apply_flag_props(line, flags);
            }
            160 => {
                let flags = line.args[1];
                line.line_id = if flags & 8 != 0 { line.args[4] } else { (line.args[4] << 8) + line.args[0] };
                line.args[4] = 0;
                // flags not preserved further: unlike 121/208, special 160's
                // arg1 bits don't become UDMF boolean line properties.
            }
            181 => {
                line.line_id = line.args[2];
                line.args[2] = 0;
            }
            208 => {
                line.line_id = line.args[0];
                let flags = line.args[3];
                line.args[3] = 0;
                apply_flag_props(line, flags);
            }
            215 => {
                line.line_id = line.args[0];
                line.args[0] = 0;
            }
            222 => {
                line.line_id = line.args[0];
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFormat;

    fn line_with(map: &mut SladeMap, special: i32, args: [i32; 5]) -> u32 {
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(1.0, 0.0);
        let id = map.add_line(v1, v2);
        let line = map.line_mut(id).unwrap();
        line.special = special;
        line.args = args;
        id
    }

    #[test]
    fn special_1_moves_arg3_to_id() {
        let mut map = SladeMap::new(MapFormat::Hexen);
        let id = line_with(&mut map, 1, [0, 0, 0, 9, 0]);
        convert_hexen_specials(&mut map);
        let line = map.line(id).unwrap();
        assert_eq!(line.line_id, 9);
        assert_eq!(line.args[3], 0);
    }

    #[test]
    fn special_121_combines_arg4_high_byte_with_arg0_and_clears_args() {
        let mut map = SladeMap::new(MapFormat::Hexen);
        let id = line_with(&mut map, 121, [0x34, 0, 0, 0, 0x12]);
        convert_hexen_specials(&mut map);
        let line = map.line(id).unwrap();
        assert_eq!(line.line_id, (0x12 << 8) + 0x34);
        assert_eq!(line.special, 0);
        assert_eq!(line.args, [0; 5]);
    }

    #[test]
    fn special_160_uses_single_byte_id_when_flag_bit_8_set() {
        let mut map = SladeMap::new(MapFormat::Hexen);
        let id = line_with(&mut map, 160, [0x11, 8, 0, 0, 0x22]);
        convert_hexen_specials(&mut map);
        let line = map.line(id).unwrap();
        assert_eq!(line.line_id, 0x22);
    }

    #[test]
    fn special_208_retains_arg0_and_derives_flags_from_arg3() {
        let mut map = SladeMap::new(MapFormat::Hexen);
        let id = line_with(&mut map, 208, [7, 0, 0, FLAG_CLIPMIDTEX, 0]);
        convert_hexen_specials(&mut map);
        let line = map.line(id).unwrap();
        assert_eq!(line.line_id, 7);
        assert!(line.prop("clipmidtex").unwrap().as_bool());
        assert_eq!(line.args[3], 0);
    }

    #[test]
    fn special_222_retains_arg0_unchanged() {
        let mut map = SladeMap::new(MapFormat::Hexen);
        let id = line_with(&mut map, 222, [3, 0, 0, 0, 0]);
        convert_hexen_specials(&mut map);
        let line = map.line(id).unwrap();
        assert_eq!(line.line_id, 3);
        assert_eq!(line.args[0], 3);
    }
}
