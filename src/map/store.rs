//! Typed object store for a single map: the owning vectors, the id
//! allocator, and query/search operations over tags, ids, and geometry.

use crate::map::line::Line;
use crate::map::object::{MapObject, ObjectId};
use crate::map::sector::{BBox, Sector};
use crate::map::side::Side;
use crate::map::tag::{TagSlotKind, TagType};
use crate::map::thing::Thing;
use crate::map::vertex::Vertex;
use crate::map::MapFormat;
use crate::property::PropertyList;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Vertex,
    Side,
    Line,
    Sector,
    Thing,
}

pub struct SladeMap {
    pub vertices: Vec<Vertex>,
    pub sides: Vec<Side>,
    pub lines: Vec<Line>,
    pub sectors: Vec<Sector>,
    pub things: Vec<Thing>,

    next_id: ObjectId,
    index_of: HashMap<ObjectId, (ObjectKind, usize)>,
    /// `(obj_id, was_added)` history entries for undo reconstruction; slot 0
    /// is reserved and never issued.
    created_deleted_objects: Vec<(ObjectId, bool)>,

    pub usage_tex: HashMap<String, u32>,
    pub usage_flat: HashMap<String, u32>,
    pub usage_thing_type: HashMap<String, u32>,

    pub current_format: MapFormat,
    pub udmf_namespace: String,
    pub udmf_props: PropertyList,
    pub udmf_extra_entries: Vec<(String, Vec<u8>)>,

    /// When false (the default for all non-UDMF formats, and UDMF maps
    /// that don't set it), vertex coordinates are rounded to the nearest
    /// integer on creation; UDMF namespaces that support fractional
    /// coordinates can set this true.
    pub position_frac: bool,

    /// Mirrors `ArchiveConfig::map_split_auto_offset`: when true,
    /// `geometry::split_line` shifts the new half's `side1` x-offset and the
    /// original's `side2` x-offset by the split line's length so a texture
    /// running across the split doesn't visibly jump.
    pub split_auto_offset: bool,

    pub geometry_updated: u64,
    pub things_updated: u64,
}

impl SladeMap {
    #[must_use]
    pub fn new(format: MapFormat) -> Self {
        Self {
            vertices: Vec::new(),
            sides: Vec::new(),
            lines: Vec::new(),
            sectors: Vec::new(),
            things: Vec::new(),
            next_id: 1,
            index_of: HashMap::new(),
            created_deleted_objects: Vec::new(),
            usage_tex: HashMap::new(),
            usage_flat: HashMap::new(),
            usage_thing_type: HashMap::new(),
            current_format: format,
            udmf_namespace: String::new(),
            udmf_props: PropertyList::new(),
            udmf_extra_entries: Vec::new(),
            // Doom/Hexen vertices are 16-bit integers on disk; Doom64's are
            // 16.16 fixed-point and UDMF's are plain floats, so both of
            // those keep sub-integer precision across the store.
            position_frac: !matches!(format, MapFormat::Doom | MapFormat::Hexen),
            split_auto_offset: true,
            geometry_updated: 0,
            things_updated: 0,
        }
    }

    /// Undo-reconstruction history: `(obj_id, was_added)` pairs in the order
    /// objects were created or removed since this map was loaded.
    #[must_use]
    pub fn created_deleted_objects(&self) -> &[(ObjectId, bool)] {
        &self.created_deleted_objects
    }

    fn alloc_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_vertex(&mut self, x: f64, y: f64) -> ObjectId {
        let (x, y) = if self.position_frac { (x, y) } else { (x.round(), y.round()) };
        let id = self.alloc_id();
        let index = self.vertices.len();
        self.vertices.push(Vertex::new(id, index, x, y));
        self.index_of.insert(id, (ObjectKind::Vertex, index));
        self.created_deleted_objects.push((id, true));
        self.geometry_updated += 1;
        id
    }

    pub fn add_side(&mut self, sector: ObjectId) -> ObjectId {
        let id = self.alloc_id();
        let index = self.sides.len();
        self.sides.push(Side::new(id, index, sector));
        self.index_of.insert(id, (ObjectKind::Side, index));
        self.created_deleted_objects.push((id, true));
        if let Some(s) = self.sector_mut(sector) {
            s.connected_sides.push(id);
        }
        id
    }

    pub fn add_line(&mut self, v1: ObjectId, v2: ObjectId) -> ObjectId {
        let id = self.alloc_id();
        let index = self.lines.len();
        self.lines.push(Line::new(id, index, v1, v2));
        self.index_of.insert(id, (ObjectKind::Line, index));
        self.created_deleted_objects.push((id, true));
        if let Some(v) = self.vertex_mut(v1) {
            v.connected_lines.push(id);
        }
        if v1 != v2 {
            if let Some(v) = self.vertex_mut(v2) {
                v.connected_lines.push(id);
            }
        }
        self.geometry_updated += 1;
        id
    }

    pub fn add_sector(&mut self, floor_tex: impl Into<String>, ceiling_tex: impl Into<String>) -> ObjectId {
        let id = self.alloc_id();
        let index = self.sectors.len();
        self.sectors.push(Sector::new(id, index, floor_tex, ceiling_tex));
        self.index_of.insert(id, (ObjectKind::Sector, index));
        self.created_deleted_objects.push((id, true));
        id
    }

    pub fn add_thing(&mut self, x: f64, y: f64, thing_type: i32) -> ObjectId {
        let id = self.alloc_id();
        let index = self.things.len();
        self.things.push(Thing::new(id, index, x, y, thing_type));
        self.index_of.insert(id, (ObjectKind::Thing, index));
        self.created_deleted_objects.push((id, true));
        self.things_updated += 1;
        id
    }

    #[must_use]
    pub fn kind_of(&self, id: ObjectId) -> Option<ObjectKind> {
        self.index_of.get(&id).map(|(kind, _)| *kind)
    }

    #[must_use]
    pub fn vertex(&self, id: ObjectId) -> Option<&Vertex> {
        self.index_of.get(&id).and_then(|&(kind, idx)| (kind == ObjectKind::Vertex).then(|| &self.vertices[idx]))
    }
    pub fn vertex_mut(&mut self, id: ObjectId) -> Option<&mut Vertex> {
        let idx = self.index_of.get(&id).copied()?;
        (idx.0 == ObjectKind::Vertex).then(|| &mut self.vertices[idx.1])
    }
    #[must_use]
    pub fn side(&self, id: ObjectId) -> Option<&Side> {
        self.index_of.get(&id).and_then(|&(kind, idx)| (kind == ObjectKind::Side).then(|| &self.sides[idx]))
    }
    pub fn side_mut(&mut self, id: ObjectId) -> Option<&mut Side> {
        let idx = self.index_of.get(&id).copied()?;
        (idx.0 == ObjectKind::Side).then(|| &mut self.sides[idx.1])
    }
    #[must_use]
    pub fn line(&self, id: ObjectId) -> Option<&Line> {
        self.index_of.get(&id).and_then(|&(kind, idx)| (kind == ObjectKind::Line).then(|| &self.lines[idx]))
    }
    pub fn line_mut(&mut self, id: ObjectId) -> Option<&mut Line> {
        let idx = self.index_of.get(&id).copied()?;
        (idx.0 == ObjectKind::Line).then(|| &mut self.lines[idx.1])
    }
    #[must_use]
    pub fn sector(&self, id: ObjectId) -> Option<&Sector> {
        self.index_of.get(&id).and_then(|&(kind, idx)| (kind == ObjectKind::Sector).then(|| &self.sectors[idx]))
    }
    pub fn sector_mut(&mut self, id: ObjectId) -> Option<&mut Sector> {
        let idx = self.index_of.get(&id).copied()?;
        (idx.0 == ObjectKind::Sector).then(|| &mut self.sectors[idx.1])
    }
    #[must_use]
    pub fn thing(&self, id: ObjectId) -> Option<&Thing> {
        self.index_of.get(&id).and_then(|&(kind, idx)| (kind == ObjectKind::Thing).then(|| &self.things[idx]))
    }
    pub fn thing_mut(&mut self, id: ObjectId) -> Option<&mut Thing> {
        let idx = self.index_of.get(&id).copied()?;
        (idx.0 == ObjectKind::Thing).then(|| &mut self.things[idx.1])
    }

    pub fn remove_vertex(&mut self, id: ObjectId) {
        self.remove_generic(id, ObjectKind::Vertex);
    }
    pub fn remove_side(&mut self, id: ObjectId) {
        self.remove_generic(id, ObjectKind::Side);
    }
    pub fn remove_line(&mut self, id: ObjectId) {
        self.remove_generic(id, ObjectKind::Line);
    }
    pub fn remove_sector(&mut self, id: ObjectId) {
        self.remove_generic(id, ObjectKind::Sector);
    }
    pub fn remove_thing(&mut self, id: ObjectId) {
        self.remove_generic(id, ObjectKind::Thing);
    }

    fn remove_generic(&mut self, id: ObjectId, kind: ObjectKind) {
        let Some(&(found_kind, idx)) = self.index_of.get(&id) else { return };
        if found_kind != kind {
            return;
        }
        match kind {
            ObjectKind::Vertex => {
                self.vertices.swap_remove(idx);
                if idx < self.vertices.len() {
                    let moved_id = self.vertices[idx].obj_id();
                    self.index_of.insert(moved_id, (kind, idx));
                }
            }
            ObjectKind::Side => {
                self.sides.swap_remove(idx);
                if idx < self.sides.len() {
                    let moved_id = self.sides[idx].obj_id();
                    self.index_of.insert(moved_id, (kind, idx));
                }
            }
            ObjectKind::Line => {
                self.lines.swap_remove(idx);
                if idx < self.lines.len() {
                    let moved_id = self.lines[idx].obj_id();
                    self.index_of.insert(moved_id, (kind, idx));
                }
            }
            ObjectKind::Sector => {
                self.sectors.swap_remove(idx);
                if idx < self.sectors.len() {
                    let moved_id = self.sectors[idx].obj_id();
                    self.index_of.insert(moved_id, (kind, idx));
                }
            }
            ObjectKind::Thing => {
                self.things.swap_remove(idx);
                if idx < self.things.len() {
                    let moved_id = self.things[idx].obj_id();
                    self.index_of.insert(moved_id, (kind, idx));
                }
            }
        }
        self.index_of.remove(&id);
        self.created_deleted_objects.push((id, false));
    }

    /// Removes every sector left with no connected sides, e.g. after
    /// [`crate::map::geometry::correct_sectors`] detaches the last side
    /// that referenced it.
    pub fn remove_detached_sectors(&mut self) {
        let detached: Vec<ObjectId> = self.sectors.iter().filter(|s| s.connected_sides.is_empty()).map(MapObject::obj_id).collect();
        for id in detached {
            self.remove_sector(id);
        }
    }

    /// Reassigns contiguous `index` values within each typed vector; call
    /// after bulk removals.
    pub fn refresh_indices(&mut self) {
        for (i, v) in self.vertices.iter_mut().enumerate() {
            v.set_index(i);
        }
        for (i, s) in self.sides.iter_mut().enumerate() {
            s.set_index(i);
        }
        for (i, l) in self.lines.iter_mut().enumerate() {
            l.set_index(i);
        }
        for (i, s) in self.sectors.iter_mut().enumerate() {
            s.set_index(i);
        }
        for (i, t) in self.things.iter_mut().enumerate() {
            t.set_index(i);
        }
    }

    // --- tag/id query operations ---

    pub fn put_sectors_with_tag(&self, tag: i32, out: &mut Vec<ObjectId>) {
        out.extend(self.sectors.iter().filter(|s| s.id == tag).map(MapObject::obj_id));
    }

    pub fn put_things_with_id(&self, id: i32, out: &mut Vec<ObjectId>, start: usize, type_filter: i32) {
        for t in self.things.iter().skip(start) {
            if t.tid == id && (type_filter == 0 || t.thing_type == type_filter) {
                out.push(t.obj_id());
            }
        }
    }

    pub fn put_lines_with_id(&self, id: i32, out: &mut Vec<ObjectId>) {
        out.extend(self.lines.iter().filter(|l| l.line_id == id).map(MapObject::obj_id));
    }

    pub fn put_things_with_id_in_sector_tag(&self, id: i32, tag: i32, out: &mut Vec<ObjectId>) {
        for t in &self.things {
            if t.tid != id {
                continue;
            }
            if let Some(sector_id) = self.sector_at(t.x, t.y) {
                if self.sector(sector_id).is_some_and(|s| s.id == tag) {
                    out.push(t.obj_id());
                }
            }
        }
    }

    /// BFS from `first`: at each visited thing, its args 0..4 name further
    /// tids to enqueue.
    pub fn put_dragon_targets(&self, first: ObjectId, out: &mut Vec<ObjectId>) {
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        queue.push_back(first);
        seen.insert(first);
        while let Some(current) = queue.pop_front() {
            out.push(current);
            let Some(thing) = self.thing(current) else { continue };
            for &arg in &thing.args {
                if arg == 0 {
                    continue;
                }
                for t in &self.things {
                    if t.tid == arg && seen.insert(t.obj_id()) {
                        queue.push_back(t.obj_id());
                    }
                }
            }
        }
    }

    /// `path_type`: when a thing's special is `Patrol`/`Interpolation`, it
    /// chains to further path points by thing *type* rather than by a tag
    /// slot, so `path_type != 0` matches those things by `thing_type`
    /// instead of consulting `scope`/`id` at all.
    pub fn put_tagging_things_with_id(&self, id: i32, scope: &str, out: &mut Vec<ObjectId>, path_type: i32) {
        let kind = TagSlotKind::from_scope(scope);
        for t in &self.things {
            let tag_type = special_tag_type(t.special);
            if tag_type.is_path_type() {
                if path_type != 0 && t.thing_type == path_type {
                    out.push(t.obj_id());
                }
                continue;
            }
            if tag_type
                .tag_arg_indices()
                .iter()
                .any(|&(i, k)| Some(k) == kind && resolve_tag(tag_type, &t.args, i) == id)
            {
                out.push(t.obj_id());
            }
        }
    }

    pub fn put_tagging_lines_with_id(&self, id: i32, scope: &str, out: &mut Vec<ObjectId>) {
        let kind = TagSlotKind::from_scope(scope);
        for l in &self.lines {
            let tag_type = special_tag_type(l.special);
            if tag_type
                .tag_arg_indices()
                .iter()
                .any(|&(i, k)| Some(k) == kind && resolve_tag(tag_type, &l.args, i) == id)
            {
                out.push(l.obj_id());
            }
        }
    }

    #[must_use]
    pub fn find_unused_sector_tag(&self) -> i32 {
        let used: HashSet<i32> = self.sectors.iter().map(|s| s.id).collect();
        (1..).find(|t| !used.contains(t)).unwrap_or(1)
    }

    #[must_use]
    pub fn find_unused_thing_id(&self) -> i32 {
        let used: HashSet<i32> = self.things.iter().map(|t| t.tid).collect();
        (1..).find(|t| !used.contains(t)).unwrap_or(1)
    }

    #[must_use]
    pub fn find_unused_line_id(&self) -> i32 {
        let used: HashSet<i32> = match self.current_format {
            MapFormat::Udmf => self.lines.iter().map(|l| l.line_id).collect(),
            MapFormat::Hexen => self.lines.iter().filter(|l| l.special == 121).map(|l| l.args[0]).collect(),
            MapFormat::Doom | MapFormat::Doom64 => self.lines.iter().map(|l| l.args[0]).collect(),
        };
        (1..).find(|t| !used.contains(t)).unwrap_or(1)
    }

    /// Returns a vertex whose coordinates exactly match `(x, y)`, for
    /// `createVertex`'s dedup step (distinct from [`Self::nearest_vertex`],
    /// which allows a fuzzy radius).
    #[must_use]
    pub fn vertex_at_exact(&self, x: f64, y: f64) -> Option<ObjectId> {
        self.vertices.iter().find(|v| v.x == x && v.y == y).map(Vertex::obj_id)
    }

    /// Cheap bbox reject against `max_dist`, then exact Euclidean distance
    /// on the surviving candidates; `-1` (as `None`) if nothing is within
    /// budget.
    #[must_use]
    pub fn nearest_vertex(&self, x: f64, y: f64, max_dist: f64) -> Option<ObjectId> {
        self.vertices
            .iter()
            .filter(|v| (v.x - x).abs() <= max_dist && (v.y - y).abs() <= max_dist)
            .map(|v| (v.obj_id(), v.distance_to(x, y)))
            .filter(|&(_, d)| d <= max_dist)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    #[must_use]
    pub fn nearest_thing(&self, x: f64, y: f64, max_dist: f64) -> Option<ObjectId> {
        self.things
            .iter()
            .filter(|t| (t.x - x).abs() <= max_dist && (t.y - y).abs() <= max_dist)
            .map(|t| (t.obj_id(), t.distance_to(x, y)))
            .filter(|&(_, d)| d <= max_dist)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    #[must_use]
    pub fn nearest_line(&self, x: f64, y: f64, max_dist: f64) -> Option<ObjectId> {
        let mut best: Option<(ObjectId, f64)> = None;
        for l in &self.lines {
            let (Some(v1), Some(v2)) = (self.vertex(l.v1), self.vertex(l.v2)) else { continue };
            let d = crate::map::geometry::point_segment_distance(x, y, v1.x, v1.y, v2.x, v2.y);
            if d <= max_dist && best.is_none_or(|(_, bd)| d < bd) {
                best = Some((l.obj_id(), d));
            }
        }
        best.map(|(id, _)| id)
    }

    #[must_use]
    pub fn bounds(&self, include_things: bool) -> BBox {
        let mut bbox = BBox { min_x: f64::MAX, min_y: f64::MAX, max_x: f64::MIN, max_y: f64::MIN };
        for v in &self.vertices {
            bbox.min_x = bbox.min_x.min(v.x);
            bbox.min_y = bbox.min_y.min(v.y);
            bbox.max_x = bbox.max_x.max(v.x);
            bbox.max_y = bbox.max_y.max(v.y);
        }
        if include_things {
            for t in &self.things {
                bbox.min_x = bbox.min_x.min(t.x);
                bbox.min_y = bbox.min_y.min(t.y);
                bbox.max_x = bbox.max_x.max(t.x);
                bbox.max_y = bbox.max_y.max(t.y);
            }
        }
        if bbox.min_x > bbox.max_x {
            return BBox::default();
        }
        bbox
    }

    /// First sector (lowest index) whose cached polygon contains `(x, y)`.
    #[must_use]
    pub fn sector_at(&self, x: f64, y: f64) -> Option<ObjectId> {
        self.sectors
            .iter()
            .find(|s| s.polygon.as_ref().is_some_and(|poly| crate::map::geometry::point_in_polygon(x, y, poly)))
            .map(MapObject::obj_id)
    }
}

fn special_tag_type(special: i32) -> TagType {
    // A compact slice of the action-special → tag-shape table; specials not
    // listed carry no tag.
    match special {
        1 | 4 | 10 => TagType::Sector,
        9 => TagType::Patrol,
        121 => TagType::LineId,
        181 => TagType::Thing1Sector2,
        208 => TagType::Sector1Sector2,
        212 => TagType::Interpolation,
        _ => TagType::None,
    }
}

fn resolve_tag(tag_type: TagType, args: &[i32; 5], arg_index: usize) -> i32 {
    let raw = args[arg_index];
    if tag_type == TagType::LineNegative { raw.abs() } else { raw }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_never_reuses_ids_after_removal() {
        let mut map = SladeMap::new(MapFormat::Doom);
        let a = map.add_vertex(0.0, 0.0);
        let b = map.add_vertex(1.0, 1.0);
        map.remove_vertex(a);
        let c = map.add_vertex(2.0, 2.0);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn nearest_vertex_respects_budget() {
        let mut map = SladeMap::new(MapFormat::Doom);
        map.add_vertex(100.0, 100.0);
        assert!(map.nearest_vertex(0.0, 0.0, 10.0).is_none());
        assert!(map.nearest_vertex(100.0, 100.0, 10.0).is_some());
    }

    #[test]
    fn find_unused_sector_tag_skips_taken_values() {
        let mut map = SladeMap::new(MapFormat::Doom);
        let s = map.add_sector("FLOOR", "CEIL");
        map.sector_mut(s).unwrap().id = 1;
        assert_eq!(map.find_unused_sector_tag(), 2);
    }

    #[test]
    fn put_dragon_targets_follows_chained_tids() {
        let mut map = SladeMap::new(MapFormat::Hexen);
        let a = map.add_thing(0.0, 0.0, 1);
        map.thing_mut(a).unwrap().tid = 1;
        map.thing_mut(a).unwrap().args = [2, 0, 0, 0, 0];
        let b = map.add_thing(10.0, 0.0, 1);
        map.thing_mut(b).unwrap().tid = 2;

        let mut out = Vec::new();
        map.put_dragon_targets(a, &mut out);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn put_tagging_lines_with_id_respects_scope() {
        // special 181 -> Thing1Sector2: arg0 is a thing-tag slot, arg1 a
        // sector-tag slot. A coincidental match in the wrong slot must not
        // count.
        let mut map = SladeMap::new(MapFormat::Hexen);
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let l = map.add_line(v1, v2);
        map.line_mut(l).unwrap().special = 181;
        map.line_mut(l).unwrap().args = [5, 7, 0, 0, 0];

        let mut out = Vec::new();
        map.put_tagging_lines_with_id(5, "things", &mut out);
        assert_eq!(out, vec![l]);

        out.clear();
        map.put_tagging_lines_with_id(5, "sectors", &mut out);
        assert!(out.is_empty());

        out.clear();
        map.put_tagging_lines_with_id(7, "sectors", &mut out);
        assert_eq!(out, vec![l]);

        out.clear();
        map.put_tagging_lines_with_id(7, "things", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn put_tagging_things_with_id_follows_path_type_by_thing_type() {
        let mut map = SladeMap::new(MapFormat::Hexen);
        let a = map.add_thing(0.0, 0.0, 9001);
        map.thing_mut(a).unwrap().special = 9; // maps to TagType::Patrol
        let mut out = Vec::new();
        map.put_tagging_things_with_id(0, "things", &mut out, 9001);
        assert_eq!(out, vec![a]);

        out.clear();
        map.put_tagging_things_with_id(0, "things", &mut out, 1234);
        assert!(out.is_empty());
    }
}
