//! UDMF text reader/writer. Reading is delegated to an injected
//! [`TextParser`]; defaults to the crate's own recursive-descent parser.

use crate::errors::MapError;
use crate::map::object::MapObject;
use crate::map::store::SladeMap;
use crate::map::MapFormat;
use crate::property::Property;
use crate::services::{TextParser, UdmfBlock, UdmfLiteral};
use std::collections::HashMap;
use std::fmt::Write as _;

fn literal_to_property(literal: &UdmfLiteral) -> Property {
    match literal {
        UdmfLiteral::Bool(b) => Property::Bool(*b),
        UdmfLiteral::Int(i) => Property::Int(i32::try_from(*i).unwrap_or(0)),
        UdmfLiteral::Float(f) => Property::Float(*f),
        UdmfLiteral::String(s) => Property::String(s.clone()),
    }
}

fn required_float(block: &UdmfBlock, key: &str) -> Option<f64> {
    block.field(key).map(|l| match l {
        UdmfLiteral::Int(i) => *i as f64,
        UdmfLiteral::Float(f) => *f,
        _ => 0.0,
    })
}

fn required_int(block: &UdmfBlock, key: &str) -> Option<i32> {
    block.field(key).map(|l| match l {
        UdmfLiteral::Int(i) => i32::try_from(*i).unwrap_or(0),
        UdmfLiteral::Float(f) => *f as i32,
        _ => 0,
    })
}

fn apply_extra_fields(props: &mut crate::property::PropertyList, block: &UdmfBlock, skip: &[&str]) {
    for (key, value) in &block.fields {
        if skip.iter().any(|s| key.eq_ignore_ascii_case(s)) {
            continue;
        }
        props.set(key, literal_to_property(value));
    }
}

/// Reads a `TEXTMAP` lump's text into `map`, dropping any block missing a
/// required property.
pub fn read_text(map: &mut SladeMap, text: &str, parser: &dyn TextParser) -> Result<(), MapError> {
    let doc = parser.parse(text).map_err(MapError::ParserError)?;
    if let Some(ns) = doc.namespace {
        map.udmf_namespace = ns;
    }

    let mut vertex_blocks = Vec::new();
    let mut sector_blocks = Vec::new();
    let mut side_blocks = Vec::new();
    let mut line_blocks = Vec::new();
    let mut thing_blocks = Vec::new();

    for block in doc.blocks {
        match block.kind.as_str() {
            "vertex" => vertex_blocks.push(block),
            "sector" => sector_blocks.push(block),
            "sidedef" => side_blocks.push(block),
            "linedef" => line_blocks.push(block),
            "thing" => thing_blocks.push(block),
            _ => {
                for (k, v) in block.fields {
                    map.udmf_props.set(&k, literal_to_property(&v));
                }
            }
        }
    }

    for block in &vertex_blocks {
        let (Some(x), Some(y)) = (required_float(block, "x"), required_float(block, "y")) else { continue };
        let id = map.add_vertex(x, y);
        apply_extra_fields(&mut map.vertex_mut(id).expect("just created").header_mut().props, block, &["x", "y"]);
    }

    for block in &sector_blocks {
        let f_tex = block.field("texturefloor").map(|_| ()).is_some();
        let c_tex = block.field("textureceiling").map(|_| ()).is_some();
        if !f_tex || !c_tex {
            continue;
        }
        let f_name = string_field(block, "texturefloor");
        let c_name = string_field(block, "textureceiling");
        let id = map.add_sector(f_name, c_name);
        let sector = map.sector_mut(id).expect("just created");
        sector.floor.height = required_float(block, "heightfloor").unwrap_or(0.0);
        sector.ceiling.height = required_float(block, "heightceiling").unwrap_or(0.0);
        sector.light = required_int(block, "lightlevel").unwrap_or(160);
        sector.special = required_int(block, "special").unwrap_or(0);
        sector.id = required_int(block, "id").unwrap_or(0);
        apply_extra_fields(
            &mut sector.header_mut().props,
            block,
            &["texturefloor", "textureceiling", "heightfloor", "heightceiling", "lightlevel", "special", "id"],
        );
    }

    for block in &side_blocks {
        let Some(sector_idx) = required_int(block, "sector") else { continue };
        if sector_idx < 0 || sector_idx as usize >= map.sectors.len() {
            continue;
        }
        let sector_id = map.sectors[sector_idx as usize].obj_id();
        let id = map.add_side(sector_id);
        let side = map.side_mut(id).expect("just created");
        if let Some(t) = string_field_opt(block, "texturetop") {
            side.tex_upper = t;
        }
        if let Some(t) = string_field_opt(block, "texturemiddle") {
            side.tex_middle = t;
        }
        if let Some(t) = string_field_opt(block, "texturebottom") {
            side.tex_lower = t;
        }
        side.offset_x = required_int(block, "offsetx").unwrap_or(0);
        side.offset_y = required_int(block, "offsety").unwrap_or(0);
        apply_extra_fields(
            &mut side.header_mut().props,
            block,
            &["sector", "texturetop", "texturemiddle", "texturebottom", "offsetx", "offsety"],
        );
    }

    for block in &line_blocks {
        let (Some(v1_idx), Some(v2_idx), Some(s1_idx)) =
            (required_int(block, "v1"), required_int(block, "v2"), required_int(block, "sidefront"))
        else {
            continue;
        };
        if v1_idx < 0 || v1_idx as usize >= map.vertices.len() || v2_idx < 0 || v2_idx as usize >= map.vertices.len() {
            continue;
        }
        let v1_id = map.vertices[v1_idx as usize].obj_id();
        let v2_id = map.vertices[v2_idx as usize].obj_id();
        let id = map.add_line(v1_id, v2_id);

        let side1 = (s1_idx >= 0 && (s1_idx as usize) < map.sides.len()).then(|| map.sides[s1_idx as usize].obj_id());
        let side2 = required_int(block, "sideback")
            .filter(|&i| i >= 0 && (i as usize) < map.sides.len())
            .map(|i| map.sides[i as usize].obj_id());

        let line = map.line_mut(id).expect("just created");
        line.side1 = side1;
        line.side2 = side2;
        line.special = required_int(block, "special").unwrap_or(0);
        line.line_id = required_int(block, "id").unwrap_or(0);
        apply_extra_fields(&mut line.header_mut().props, block, &["v1", "v2", "sidefront", "sideback", "special", "id"]);
    }

    for block in &thing_blocks {
        let (Some(x), Some(y), Some(ttype)) = (required_float(block, "x"), required_float(block, "y"), required_int(block, "type"))
        else {
            continue;
        };
        let id = map.add_thing(x, y, ttype);
        let thing = map.thing_mut(id).expect("just created");
        thing.angle = required_int(block, "angle").unwrap_or(0);
        apply_extra_fields(&mut thing.header_mut().props, block, &["x", "y", "type", "angle"]);
    }

    Ok(())
}

fn string_field(block: &UdmfBlock, key: &str) -> String {
    string_field_opt(block, key).unwrap_or_default()
}

fn string_field_opt(block: &UdmfBlock, key: &str) -> Option<String> {
    match block.field(key)? {
        UdmfLiteral::String(s) => Some(s.clone()),
        UdmfLiteral::Int(i) => Some(i.to_string()),
        UdmfLiteral::Float(f) => Some(f.to_string()),
        UdmfLiteral::Bool(b) => Some(b.to_string()),
    }
}

/// Emits `namespace="…";` then map-scope properties, then one block per
/// object in vertex/linedef/sidedef/sector/thing order. Only properties
/// that differ from their wire default are written.
#[must_use]
pub fn write_text(map: &SladeMap) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "namespace=\"{}\";", map.udmf_namespace);
    for (key, value) in map.udmf_props.iter() {
        let _ = writeln!(out, "{key}={};", format_literal(value));
    }

    let vertex_index: HashMap<u32, usize> = map.vertices.iter().enumerate().map(|(i, v)| (v.obj_id(), i)).collect();
    let sector_index: HashMap<u32, usize> = map.sectors.iter().enumerate().map(|(i, s)| (s.obj_id(), i)).collect();
    let side_index: HashMap<u32, usize> = map.sides.iter().enumerate().map(|(i, s)| (s.obj_id(), i)).collect();

    for v in &map.vertices {
        out.push_str("vertex\n{\n");
        let _ = writeln!(out, "x={:.3};", v.x);
        let _ = writeln!(out, "y={:.3};", v.y);
        write_extra(&mut out, v.prop_list());
        out.push_str("}\n");
    }

    for l in &map.lines {
        out.push_str("linedef\n{\n");
        let _ = writeln!(out, "v1={};", vertex_index.get(&l.v1).copied().unwrap_or(0));
        let _ = writeln!(out, "v2={};", vertex_index.get(&l.v2).copied().unwrap_or(0));
        if let Some(s1) = l.side1.and_then(|id| side_index.get(&id)) {
            let _ = writeln!(out, "sidefront={s1};");
        }
        if let Some(s2) = l.side2.and_then(|id| side_index.get(&id)) {
            let _ = writeln!(out, "sideback={s2};");
        }
        if l.special != 0 {
            let _ = writeln!(out, "special={};", l.special);
        }
        if l.line_id != 0 {
            let _ = writeln!(out, "id={};", l.line_id);
        }
        write_extra(&mut out, l.prop_list());
        out.push_str("}\n");
    }

    for s in &map.sides {
        out.push_str("sidedef\n{\n");
        let _ = writeln!(out, "sector={};", sector_index.get(&s.sector).copied().unwrap_or(0));
        if s.tex_upper != "-" {
            let _ = writeln!(out, "texturetop=\"{}\";", s.tex_upper);
        }
        if s.tex_middle != "-" {
            let _ = writeln!(out, "texturemiddle=\"{}\";", s.tex_middle);
        }
        if s.tex_lower != "-" {
            let _ = writeln!(out, "texturebottom=\"{}\";", s.tex_lower);
        }
        if s.offset_x != 0 {
            let _ = writeln!(out, "offsetx={};", s.offset_x);
        }
        if s.offset_y != 0 {
            let _ = writeln!(out, "offsety={};", s.offset_y);
        }
        write_extra(&mut out, s.prop_list());
        out.push_str("}\n");
    }

    for s in &map.sectors {
        out.push_str("sector\n{\n");
        let _ = writeln!(out, "heightfloor={};", s.floor.height as i64);
        let _ = writeln!(out, "heightceiling={};", s.ceiling.height as i64);
        let _ = writeln!(out, "texturefloor=\"{}\";", s.floor.texture);
        let _ = writeln!(out, "textureceiling=\"{}\";", s.ceiling.texture);
        if s.light != 160 {
            let _ = writeln!(out, "lightlevel={};", s.light);
        }
        if s.special != 0 {
            let _ = writeln!(out, "special={};", s.special);
        }
        if s.id != 0 {
            let _ = writeln!(out, "id={};", s.id);
        }
        write_extra(&mut out, s.prop_list());
        out.push_str("}\n");
    }

    for t in &map.things {
        out.push_str("thing\n{\n");
        let _ = writeln!(out, "x={:.3};", t.x);
        let _ = writeln!(out, "y={:.3};", t.y);
        let _ = writeln!(out, "type={};", t.thing_type);
        if t.angle != 0 {
            let _ = writeln!(out, "angle={};", t.angle);
        }
        write_extra(&mut out, t.prop_list());
        out.push_str("}\n");
    }

    out
}

fn write_extra(out: &mut String, props: &crate::property::PropertyList) {
    for (key, value) in props.iter() {
        let _ = writeln!(out, "{key}={};", format_literal(value));
    }
}

fn format_literal(value: &Property) -> String {
    match value {
        Property::Bool(b) => b.to_string(),
        Property::Int(i) => i.to_string(),
        Property::UInt(u) => u.to_string(),
        Property::Float(f) => format!("{f:.3}"),
        Property::String(s) => format!("\"{s}\""),
    }
}

pub const fn format() -> MapFormat {
    MapFormat::Udmf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFormat as Fmt;
    use crate::services::UdmfTextParser;

    #[test]
    fn reads_minimal_map_with_one_line() {
        let text = r#"
            namespace="doom";
            vertex { x = 0.0; y = 0.0; }
            vertex { x = 64.0; y = 0.0; }
            sector { texturefloor = "FLOOR4_8"; textureceiling = "CEIL3_5"; }
            sidedef { sector = 0; }
            linedef { v1 = 0; v2 = 1; sidefront = 0; }
        "#;
        let mut map = SladeMap::new(Fmt::Udmf);
        read_text(&mut map, text, &UdmfTextParser).unwrap();
        assert_eq!(map.udmf_namespace, "doom");
        assert_eq!(map.vertices.len(), 2);
        assert_eq!(map.lines.len(), 1);
        assert!(map.lines[0].side1.is_some());
    }

    #[test]
    fn drops_blocks_missing_required_properties() {
        let text = r#"vertex { x = 1.0; }"#;
        let mut map = SladeMap::new(Fmt::Udmf);
        read_text(&mut map, text, &UdmfTextParser).unwrap();
        assert!(map.vertices.is_empty());
    }

    #[test]
    fn write_then_read_round_trips_vertex_coordinates() {
        let mut map = SladeMap::new(Fmt::Udmf);
        map.udmf_namespace = "doom".to_string();
        map.add_vertex(10.0, -5.0);
        let text = write_text(&map);
        let mut reread = SladeMap::new(Fmt::Udmf);
        read_text(&mut reread, &text, &UdmfTextParser).unwrap();
        assert_eq!(reread.vertices.len(), 1);
        assert!((reread.vertices[0].x - 10.0).abs() < 1e-3);
    }
}
