//! Geometric mutation operations over a [`SladeMap`]: vertex/line creation,
//! splitting, merging, and sector polygon maintenance.

use crate::map::object::{MapObject, ObjectId};
use crate::map::store::SladeMap;

const EPSILON: f64 = 1e-6;

#[must_use]
pub fn point_segment_distance(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let len_sq = dx * dx + dy * dy;
    if len_sq < EPSILON {
        return ((px - x1).powi(2) + (py - y1).powi(2)).sqrt();
    }
    let t = (((px - x1) * dx + (py - y1) * dy) / len_sq).clamp(0.0, 1.0);
    let proj_x = x1 + t * dx;
    let proj_y = y1 + t * dy;
    ((px - proj_x).powi(2) + (py - proj_y).powi(2)).sqrt()
}

/// Even-odd ray-casting test; `polygon` is a closed list of `(x, y)` vertex
/// coordinates in winding order.
#[must_use]
pub fn point_in_polygon(x: f64, y: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > y) != (yj > y) {
            let x_intersect = xj + (y - yj) / (yi - yj) * (xi - xj);
            if x < x_intersect {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Creates a new vertex at `(x, y)` (rounded to integer unless the map's
/// `position_frac` is set), or returns the id of a vertex already at that
/// exact point. When the point lands on an existing line within
/// `split_dist`, that line is split at the new vertex instead of leaving
/// it floating.
pub fn create_vertex(map: &mut SladeMap, x: f64, y: f64, split_dist: f64) -> ObjectId {
    let (x, y) = if map.position_frac { (x, y) } else { (x.round(), y.round()) };
    if let Some(existing) = map.vertex_at_exact(x, y) {
        return existing;
    }
    let id = map.add_vertex(x, y);
    if split_dist >= 0.0 {
        if let Some(line_id) = map.nearest_line(x, y, split_dist) {
            split_line(map, line_id, id);
        }
    }
    id
}

/// Creates a line between two points, creating or reusing vertices at each
/// end via [`create_vertex`].
pub fn create_line(map: &mut SladeMap, x1: f64, y1: f64, x2: f64, y2: f64, split_dist: f64) -> ObjectId {
    let v1 = create_vertex(map, x1, y1, split_dist);
    let v2 = create_vertex(map, x2, y2, split_dist);
    create_line_between(map, v1, v2, false)
}

/// Creates a line between two existing vertices. Unless `force`, returns
/// the existing line id if `v1`/`v2` are already joined by one (in either
/// direction).
pub fn create_line_between(map: &mut SladeMap, v1: ObjectId, v2: ObjectId, force: bool) -> ObjectId {
    if !force {
        if let Some(existing) = map.lines.iter().find(|l| (l.v1 == v1 && l.v2 == v2) || (l.v1 == v2 && l.v2 == v1)) {
            return existing.obj_id();
        }
    }
    map.add_line(v1, v2)
}

/// Splits `line_id` at `vertex_id`, which must already lie on the line
/// (typically placed there by the caller). The original line keeps `v1`
/// and gets a new `v2` at the split point; a new line continues from there
/// to the original `v2`, inheriting side textures/sector assignments.
pub fn split_line(map: &mut SladeMap, line_id: ObjectId, vertex_id: ObjectId) -> ObjectId {
    let Some(line) = map.line(line_id) else { return 0 };
    let original_v1 = line.v1;
    let original_v2 = line.v2;
    let side1 = line.side1;
    let side2 = line.side2;
    let special = line.special;
    let flags = line.flags;
    let line_tag = line.line_id;
    let args = line.args;

    // §6 `map_split_auto_offset`: keep a texture spanning the split looking
    // continuous by shifting each half's x-offset by the other half's length.
    let auto_offset = map.split_auto_offset;
    let (len_a, len_b) = if auto_offset {
        let pos = |id: ObjectId| map.vertex(id).map(|v| (v.x, v.y));
        match (pos(original_v1), pos(vertex_id), pos(original_v2)) {
            (Some((x1, y1)), Some((xs, ys)), Some((x2, y2))) => {
                (f64::hypot(xs - x1, ys - y1), f64::hypot(x2 - xs, y2 - ys))
            }
            _ => (0.0, 0.0),
        }
    } else {
        (0.0, 0.0)
    };

    if let Some(v2_ref) = map.vertex_mut(original_v2) {
        v2_ref.connected_lines.retain(|&l| l != line_id);
    }

    let new_line_id = map.add_line(vertex_id, original_v2);
    {
        let new_line = map.line_mut(new_line_id).expect("just created");
        new_line.special = special;
        new_line.flags = flags;
        new_line.line_id = line_tag;
        new_line.args = args;
    }

    if let Some(old_s1) = side1 {
        let sector = map.side(old_s1).map(|s| s.sector).unwrap_or(0);
        let tex_upper = map.side(old_s1).map(|s| s.tex_upper.clone()).unwrap_or_default();
        let tex_middle = map.side(old_s1).map(|s| s.tex_middle.clone()).unwrap_or_default();
        let tex_lower = map.side(old_s1).map(|s| s.tex_lower.clone()).unwrap_or_default();
        let (offset_x, offset_y) = map.side(old_s1).map(|s| (s.offset_x, s.offset_y)).unwrap_or_default();
        let new_side = map.add_side(sector);
        if let Some(s) = map.side_mut(new_side) {
            s.parent_line = new_line_id;
            s.tex_upper = tex_upper;
            s.tex_middle = tex_middle;
            s.tex_lower = tex_lower;
            s.offset_x = offset_x + len_a.round() as i32;
            s.offset_y = offset_y;
        }
        if let Some(new_line) = map.line_mut(new_line_id) {
            new_line.side1 = Some(new_side);
        }
    }
    if let Some(old_s2) = side2 {
        let sector = map.side(old_s2).map(|s| s.sector).unwrap_or(0);
        let tex_upper = map.side(old_s2).map(|s| s.tex_upper.clone()).unwrap_or_default();
        let tex_middle = map.side(old_s2).map(|s| s.tex_middle.clone()).unwrap_or_default();
        let tex_lower = map.side(old_s2).map(|s| s.tex_lower.clone()).unwrap_or_default();
        let new_side = map.add_side(sector);
        if let Some(s) = map.side_mut(new_side) {
            s.parent_line = new_line_id;
            s.tex_upper = tex_upper;
            s.tex_middle = tex_middle;
            s.tex_lower = tex_lower;
        }
        if let Some(new_line) = map.line_mut(new_line_id) {
            new_line.side2 = Some(new_side);
        }
        if auto_offset {
            if let Some(s) = map.side_mut(old_s2) {
                s.offset_x += len_b.round() as i32;
            }
        }
    }

    if let Some(l) = map.line_mut(line_id) {
        l.v2 = vertex_id;
        l.set_modified();
    }
    if let Some(v) = map.vertex_mut(vertex_id) {
        v.connected_lines.push(line_id);
        v.connected_lines.push(new_line_id);
    }
    map.geometry_updated += 1;
    new_line_id
}

/// Splits every line within `split_dist` of `vertex_id`'s position, except
/// `exclude` and any line already incident to `vertex_id`, so the new vertex
/// participates in the surrounding geometry instead of just dangling.
pub fn split_lines_at(map: &mut SladeMap, vertex_id: ObjectId, split_dist: f64, exclude: ObjectId) {
    let Some(v) = map.vertex(vertex_id) else { return };
    let (x, y) = (v.x, v.y);
    let candidates: Vec<ObjectId> = map
        .lines
        .iter()
        .filter(|l| l.obj_id() != exclude && l.v1 != vertex_id && l.v2 != vertex_id)
        .filter_map(|l| {
            let (v1, v2) = (map.vertex(l.v1)?, map.vertex(l.v2)?);
            let d = point_segment_distance(x, y, v1.x, v1.y, v2.x, v2.y);
            (d <= split_dist).then_some(l.obj_id())
        })
        .collect();
    for line_id in candidates {
        split_line(map, line_id, vertex_id);
    }
}

/// Merges `from` into `to`: every line endpoint and thing/sector reference
/// pointing at `from` is repointed to `to`, lines that would become
/// zero-length are removed, and `from` is deleted.
pub fn merge_vertices(map: &mut SladeMap, from: ObjectId, to: ObjectId) {
    if from == to {
        return;
    }
    let connected: Vec<ObjectId> = map.vertex(from).map(|v| v.connected_lines.clone()).unwrap_or_default();
    let mut to_remove = Vec::new();
    for line_id in connected {
        let Some(line) = map.line_mut(line_id) else { continue };
        if line.v1 == from {
            line.v1 = to;
        }
        if line.v2 == from {
            line.v2 = to;
        }
        line.set_modified();
        if line.v1 == line.v2 {
            to_remove.push(line_id);
        } else if let Some(to_v) = map.vertex_mut(to) {
            if !to_v.connected_lines.contains(&line_id) {
                to_v.connected_lines.push(line_id);
            }
        }
    }
    for line_id in to_remove {
        map.remove_line(line_id);
    }
    map.remove_vertex(from);
    map.geometry_updated += 1;
}

/// Merges every vertex within `merge_dist` of `(x, y)` into a single
/// surviving vertex (the first found), returning its id.
pub fn merge_vertices_point(map: &mut SladeMap, x: f64, y: f64, merge_dist: f64) -> Option<ObjectId> {
    let nearby: Vec<ObjectId> = map
        .vertices
        .iter()
        .filter(|v| v.distance_to(x, y) <= merge_dist)
        .map(MapObject::obj_id)
        .collect();
    let survivor = *nearby.first()?;
    for other in nearby.into_iter().skip(1) {
        merge_vertices(map, other, survivor);
    }
    Some(survivor)
}

/// Merges `line_id` with any coincident/overlapping parallel line sharing
/// both endpoints (in either direction), keeping `line_id` and deleting the
/// duplicate.
pub fn merge_line(map: &mut SladeMap, line_id: ObjectId) {
    let Some(line) = map.line(line_id) else { return };
    let (v1, v2) = (line.v1, line.v2);
    let duplicate = map
        .lines
        .iter()
        .find(|l| l.obj_id() != line_id && ((l.v1 == v1 && l.v2 == v2) || (l.v1 == v2 && l.v2 == v1)))
        .map(MapObject::obj_id);
    if let Some(dup) = duplicate {
        map.remove_line(dup);
        map.geometry_updated += 1;
        correct_line_sectors(map, line_id);
    }
}

/// Returns `(v1, v2, x1, y1, x2, y2)` for `line_id`, or `None` if the line
/// or either endpoint vertex no longer exists.
fn line_endpoints(map: &SladeMap, line_id: ObjectId) -> Option<(ObjectId, ObjectId, f64, f64, f64, f64)> {
    let line = map.line(line_id)?;
    let (v1, v2) = (line.v1, line.v2);
    let a = map.vertex(v1)?;
    let b = map.vertex(v2)?;
    Some((v1, v2, a.x, a.y, b.x, b.y))
}

/// Intersection point of open segments `(p1, p2)` and `(p3, p4)`, excluding
/// endpoints, or `None` if they're parallel or don't cross.
fn segment_intersection(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64), p4: (f64, f64)) -> Option<(f64, f64)> {
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    let (x3, y3) = p3;
    let (x4, y4) = p4;
    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < EPSILON {
        return None;
    }
    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    let u = ((x1 - x3) * (y1 - y2) - (y1 - y3) * (x1 - x2)) / denom;
    if t > EPSILON && t < 1.0 - EPSILON && u > EPSILON && u < 1.0 - EPSILON {
        Some((x1 + t * (x2 - x1), y1 + t * (y2 - y1)))
    } else {
        None
    }
}

/// Merge-tolerance used internally by [`merge_arch`] for snapping input
/// vertices together and onto lines they land on; distinct from the
/// caller-provided `split_dist`, which governs splitting at intersections
/// created along the way.
const ARCH_MERGE_TOLERANCE: f64 = 0.1;

/// Architecture merge (§4.7 `mergeArch`): snaps every vertex in
/// `vertices_to_process` to any other input or existing vertex within
/// [`ARCH_MERGE_TOLERANCE`], splits lines the survivors land on, splits
/// survivor-connected lines at line–line intersections, removes duplicate
/// overlapping lines (transferring the removed line's side onto the one
/// kept), re-traces sector polygons over the affected area, and flips any
/// line left with only a back side. Returns the surviving vertex for each
/// input, in input order (vertices that no longer exist after a merge are
/// omitted).
pub fn merge_arch(map: &mut SladeMap, vertices_to_process: &[ObjectId], split_dist: f64) -> Vec<ObjectId> {
    let mut survivors = Vec::with_capacity(vertices_to_process.len());
    for &v in vertices_to_process {
        let Some(vertex) = map.vertex(v) else { continue };
        let (x, y) = (vertex.x, vertex.y);
        if let Some(s) = merge_vertices_point(map, x, y, ARCH_MERGE_TOLERANCE) {
            if !survivors.contains(&s) {
                survivors.push(s);
            }
        }
    }

    // Split existing lines the survivors landed on.
    for &s in &survivors {
        split_lines_at(map, s, split_dist.max(ARCH_MERGE_TOLERANCE), 0);
    }

    // Lines connected to any survivor, after the splits above.
    let mut connected: Vec<ObjectId> = Vec::new();
    for &s in &survivors {
        if let Some(v) = map.vertex(s) {
            for &l in &v.connected_lines {
                if !connected.contains(&l) {
                    connected.push(l);
                }
            }
        }
    }

    // Split collected lines at any existing vertex that lies on them but
    // isn't yet one of their endpoints.
    let candidate_vertices: Vec<ObjectId> = map.vertices.iter().map(MapObject::obj_id).collect();
    let mut idx = 0;
    while idx < connected.len() {
        let line_id = connected[idx];
        let mut split_at = None;
        if let Some((v1, v2, x1, y1, x2, y2)) = line_endpoints(map, line_id) {
            for &v in &candidate_vertices {
                if v == v1 || v == v2 {
                    continue;
                }
                let Some(vertex) = map.vertex(v) else { continue };
                if point_segment_distance(vertex.x, vertex.y, x1, y1, x2, y2) <= ARCH_MERGE_TOLERANCE {
                    split_at = Some(v);
                    break;
                }
            }
        }
        if let Some(v) = split_at {
            let new_line = split_line(map, line_id, v);
            connected.push(new_line);
        }
        idx += 1;
    }

    // Detect line-line intersections among the collected lines (skipping
    // pairs that already share an endpoint), splitting both lines at each
    // crossing found. Bounded by the quadratic pair scan settling to no
    // more intersections.
    let mut i = 0;
    while i < connected.len() {
        let mut j = i + 1;
        while j < connected.len() {
            let (a, b) = (connected[i], connected[j]);
            if let (Some((av1, av2, ax1, ay1, ax2, ay2)), Some((bv1, bv2, bx1, by1, bx2, by2))) =
                (line_endpoints(map, a), line_endpoints(map, b))
            {
                let shares_endpoint = av1 == bv1 || av1 == bv2 || av2 == bv1 || av2 == bv2;
                if !shares_endpoint {
                    if let Some((ix, iy)) = segment_intersection((ax1, ay1), (ax2, ay2), (bx1, by1), (bx2, by2)) {
                        let new_v = create_vertex(map, ix, iy, -1.0);
                        let new_a = split_line(map, a, new_v);
                        let new_b = split_line(map, b, new_v);
                        connected.push(new_a);
                        connected.push(new_b);
                    }
                }
            }
            j += 1;
        }
        i += 1;
    }

    // Remove overlapping duplicate lines, transferring the removed line's
    // side(s) onto the kept one where the kept line is missing a side.
    let mut i = 0;
    while i < connected.len() {
        let keep = connected[i];
        let mut j = i + 1;
        while j < connected.len() {
            let remove = connected[j];
            let is_duplicate = match (map.line(keep), map.line(remove)) {
                (Some(k), Some(r)) => (k.v1 == r.v1 && k.v2 == r.v2) || (k.v1 == r.v2 && k.v2 == r.v1),
                _ => false,
            };
            if is_duplicate {
                let flipped = map.line(keep).zip(map.line(remove)).is_some_and(|(k, r)| k.v1 == r.v2);
                let (remove_side1, remove_side2) = map.line(remove).map(|r| (r.side1, r.side2)).unwrap_or((None, None));
                let (kept_side1, kept_side2) = map.line(keep).map(|k| (k.side1, k.side2)).unwrap_or((None, None));
                let (want_side1, want_side2) = if flipped { (remove_side2, remove_side1) } else { (remove_side1, remove_side2) };
                if kept_side1.is_none() {
                    if let Some(s) = want_side1 {
                        if let Some(side) = map.side_mut(s) {
                            side.parent_line = keep;
                        }
                        if let Some(k) = map.line_mut(keep) {
                            k.side1 = Some(s);
                        }
                    }
                }
                if kept_side2.is_none() {
                    if let Some(s) = want_side2 {
                        if let Some(side) = map.side_mut(s) {
                            side.parent_line = keep;
                        }
                        if let Some(k) = map.line_mut(keep) {
                            k.side2 = Some(s);
                        }
                    }
                }
                map.remove_line(remove);
                connected.remove(j);
                continue;
            }
            j += 1;
        }
        i += 1;
    }

    correct_sectors(map, &connected, true);

    map.geometry_updated += 1;
    survivors
}

/// Assigns the correct side to each bare (sectorless) side of `line_id`
/// based on which cached sector polygon contains the line's midpoint on
/// that side; a no-op until [`correct_sectors`] has populated polygons.
pub fn correct_line_sectors(map: &mut SladeMap, line_id: ObjectId) {
    let Some(line) = map.line(line_id) else { return };
    let (Some(v1), Some(v2)) = (map.vertex(line.v1), map.vertex(line.v2)) else { return };
    let mid_x = (v1.x + v2.x) / 2.0;
    let mid_y = (v1.y + v2.y) / 2.0;
    let dx = v2.x - v1.x;
    let dy = v2.y - v1.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < EPSILON {
        return;
    }
    let (nx, ny) = (-dy / len, dx / len);
    let front_point = (mid_x + nx * EPSILON.sqrt(), mid_y + ny * EPSILON.sqrt());
    let back_point = (mid_x - nx * EPSILON.sqrt(), mid_y - ny * EPSILON.sqrt());

    let front_sector = map.sector_at(front_point.0, front_point.1);
    let back_sector = map.sector_at(back_point.0, back_point.1);

    if let (Some(side1), Some(sector)) = (line.side1, front_sector) {
        if let Some(s) = map.side_mut(side1) {
            s.sector = sector;
        }
    }
    if let (Some(side2), Some(sector)) = (line.side2, back_sector) {
        if let Some(s) = map.side_mut(side2) {
            s.sector = sector;
        }
    }

    if map.line(line_id).is_some_and(|l| l.side1.is_none() && l.side2.is_some()) {
        if let Some(l) = map.line_mut(line_id) {
            l.flip();
        }
    }
}

/// Directed half-edge of a line: `true` means traversed `v1 -> v2` (the
/// side this edge belongs to is `side1`/front); `false` means `v2 -> v1`
/// (`side2`/back).
type DirectedEdge = (ObjectId, bool);

fn directed_endpoints(map: &SladeMap, (line_id, forward): DirectedEdge) -> Option<(ObjectId, ObjectId)> {
    let line = map.line(line_id)?;
    Some(if forward { (line.v1, line.v2) } else { (line.v2, line.v1) })
}

fn directed_side(map: &SladeMap, (line_id, forward): DirectedEdge) -> Option<ObjectId> {
    let line = map.line(line_id)?;
    if forward { line.side1 } else { line.side2 }
}

fn line_midpoint_inside_any_sector(map: &SladeMap, line_id: ObjectId) -> bool {
    let Some(line) = map.line(line_id) else { return false };
    let (Some(v1), Some(v2)) = (map.vertex(line.v1), map.vertex(line.v2)) else { return false };
    let mid = ((v1.x + v2.x) / 2.0, (v1.y + v2.y) / 2.0);
    map.sectors.iter().any(|s| s.polygon.as_ref().is_some_and(|poly| point_in_polygon(mid.0, mid.1, poly)))
}

/// The connected component (by shared vertices) reachable from `seeds`,
/// since a loop's boundary may run through pre-existing lines outside the
/// caller's edited set.
fn connected_component(map: &SladeMap, seeds: &std::collections::HashSet<ObjectId>) -> Vec<ObjectId> {
    let mut seen_lines: std::collections::HashSet<ObjectId> = std::collections::HashSet::new();
    let mut seen_vertices: std::collections::HashSet<ObjectId> = std::collections::HashSet::new();
    let mut queue: std::collections::VecDeque<ObjectId> = std::collections::VecDeque::new();

    let mut enqueue_line = |line_id: ObjectId, seen_lines: &mut std::collections::HashSet<ObjectId>, seen_vertices: &mut std::collections::HashSet<ObjectId>, queue: &mut std::collections::VecDeque<ObjectId>| {
        if !seen_lines.insert(line_id) {
            return;
        }
        if let Some(line) = map.line(line_id) {
            for v in [line.v1, line.v2] {
                if seen_vertices.insert(v) {
                    queue.push_back(v);
                }
            }
        }
    };
    for &l in seeds {
        enqueue_line(l, &mut seen_lines, &mut seen_vertices, &mut queue);
    }
    while let Some(v) = queue.pop_front() {
        let Some(vertex) = map.vertex(v) else { continue };
        for &l in &vertex.connected_lines {
            enqueue_line(l, &mut seen_lines, &mut seen_vertices, &mut queue);
        }
    }
    seen_lines.into_iter().collect()
}

/// Picks the next directed edge leaving `at_vertex`, excluding `visited`
/// ones: the candidate that turns least far clockwise from the direction
/// `prev` arrived along, which is the standard way to trace a single face
/// of a planar straight-line graph without crossing into a neighboring one.
fn next_directed_edge(
    map: &SladeMap,
    prev: DirectedEdge,
    at_vertex: ObjectId,
    edge_set: &std::collections::HashSet<DirectedEdge>,
    visited: &std::collections::HashSet<DirectedEdge>,
) -> Option<DirectedEdge> {
    let (prev_from, _) = directed_endpoints(map, prev)?;
    let prev_from_pt = map.vertex(prev_from)?;
    let at_pt = map.vertex(at_vertex)?;
    let in_angle = (at_pt.y - prev_from_pt.y).atan2(at_pt.x - prev_from_pt.x);

    let mut best: Option<(DirectedEdge, f64)> = None;
    for &edge in edge_set {
        if visited.contains(&edge) {
            continue;
        }
        let Some((from_v, to_v)) = directed_endpoints(map, edge) else { continue };
        if from_v != at_vertex {
            continue;
        }
        let Some(out_pt) = map.vertex(to_v) else { continue };
        let out_angle = (out_pt.y - at_pt.y).atan2(out_pt.x - at_pt.x);
        let mut cw = in_angle - out_angle;
        while cw <= 0.0 {
            cw += std::f64::consts::TAU;
        }
        while cw > std::f64::consts::TAU {
            cw -= std::f64::consts::TAU;
        }
        if best.as_ref().is_none_or(|&(_, best_cw)| cw < best_cw) {
            best = Some((edge, cw));
        }
    }
    best.map(|(edge, _)| edge)
}

struct TracedLoop {
    polygon: Vec<(f64, f64)>,
    edges: Vec<DirectedEdge>,
}

fn trace_directed_loop(
    map: &SladeMap,
    start: DirectedEdge,
    edge_set: &std::collections::HashSet<DirectedEdge>,
    visited: &mut std::collections::HashSet<DirectedEdge>,
) -> Option<TracedLoop> {
    let start_vertex = directed_endpoints(map, start)?.0;
    let mut polygon = Vec::new();
    let mut trail = Vec::new();
    let mut current = start;

    for _ in 0..edge_set.len() + 1 {
        if visited.contains(&current) {
            return None;
        }
        visited.insert(current);
        trail.push(current);
        let (from_v, to_v) = directed_endpoints(map, current)?;
        let from_pt = map.vertex(from_v)?;
        polygon.push((from_pt.x, from_pt.y));

        if to_v == start_vertex {
            return Some(TracedLoop { polygon, edges: trail });
        }

        current = next_directed_edge(map, current, to_v, edge_set, visited)?;
    }
    None
}

fn reassign_side_sector(map: &mut SladeMap, side_id: ObjectId, new_sector: ObjectId) {
    let old_sector = map.side(side_id).map(|s| s.sector).unwrap_or(0);
    if old_sector == new_sector {
        return;
    }
    if let Some(s) = map.sector_mut(old_sector) {
        s.connected_sides.retain(|&s| s != side_id);
    }
    if let Some(s) = map.side_mut(side_id) {
        s.sector = new_sector;
    }
    if let Some(s) = map.sector_mut(new_sector) {
        if !s.connected_sides.contains(&side_id) {
            s.connected_sides.push(side_id);
        }
    }
}

fn assign_loop_side(map: &mut SladeMap, line_id: ObjectId, forward: bool, sector: ObjectId) {
    let existing = map.line(line_id).and_then(|l| if forward { l.side1 } else { l.side2 });
    if let Some(side) = existing {
        reassign_side_sector(map, side, sector);
    } else {
        let new_side = map.add_side(sector);
        if let Some(s) = map.side_mut(new_side) {
            s.parent_line = line_id;
        }
        if let Some(l) = map.line_mut(line_id) {
            if forward {
                l.side1 = Some(new_side);
            } else {
                l.side2 = Some(new_side);
            }
        }
    }
}

/// For each one-sided line in `lines` whose side has no real middle
/// texture, fills it in from a geometrically adjacent line's texture, or
/// failing that, the game-configured default wall texture (§4.7 final
/// step).
fn apply_side_texture_defaults(map: &mut SladeMap, lines: &[ObjectId]) {
    let game = crate::services::DefaultGameConfig;
    for &line_id in lines {
        let Some(line) = map.line(line_id) else { continue };
        if !(line.side1.is_some() && line.side2.is_none()) {
            continue;
        }
        let Some(side1) = line.side1 else { continue };
        let needs_default = map.side(side1).is_some_and(|s| s.tex_middle.is_empty() || s.tex_middle == "-");
        if !needs_default {
            continue;
        }
        let adjacent_lines: Vec<ObjectId> = [line.v1, line.v2]
            .iter()
            .filter_map(|&v| map.vertex(v))
            .flat_map(|v| v.connected_lines.clone())
            .filter(|&l| l != line_id)
            .collect();
        let fallback = adjacent_lines
            .iter()
            .filter_map(|&l| map.line(l)?.side1)
            .filter_map(|s| map.side(s))
            .map(|s| s.tex_middle.clone())
            .find(|tex| !tex.is_empty() && tex != "-")
            .unwrap_or_else(|| game.default_wall_texture().to_string());
        if let Some(s) = map.side_mut(side1) {
            s.tex_middle = fallback;
        }
    }
}

/// Rebuilds sector polygons and side→sector assignments for the area
/// around `lines` (§4.7 `correctSectors`), using a `SectorBuilder`-style
/// edge trace:
///
/// 1. Build a directed-edge list over the connected component containing
///    `lines`: every line contributes its front edge, and its back edge if
///    it already has one or (when `existing_only` is false) its midpoint
///    falls inside an existing sector polygon.
/// 2. Trace a closed loop from every unvisited edge seeded by `lines`
///    (tracing itself may pass through edges of lines outside `lines`,
///    pulled in for connectivity).
/// 3. A loop made entirely of lines outside `lines`, none of which already
///    has a matching side, is an untouched interior void and is skipped
///    under `existing_only`.
/// 4. A loop whose edges already agree on one sector is left alone. A loop
///    overlapping a not-yet-reused existing sector reuses it (each existing
///    sector at most once). Otherwise a new sector is created, its
///    properties copied from an adjacent pre-existing sector if one is
///    found, else from the game's defaults.
/// 5. Sides belonging to `lines` that never ended up part of any traced
///    loop are detached and removed; lines left with only a back side are
///    flipped; one-sided lines missing a middle texture get one from an
///    adjacent line or the game default; finally sectors left with no
///    sides are removed via [`SladeMap::remove_detached_sectors`].
pub fn correct_sectors(map: &mut SladeMap, lines: &[ObjectId], existing_only: bool) {
    if lines.is_empty() {
        return;
    }
    let our_lines: std::collections::HashSet<ObjectId> = lines.iter().copied().collect();
    let subgraph = connected_component(map, &our_lines);

    let touched_sectors: std::collections::HashSet<ObjectId> = subgraph
        .iter()
        .filter_map(|&l| map.line(l))
        .flat_map(|l| [l.side1, l.side2])
        .flatten()
        .filter_map(|s| map.side(s))
        .map(|s| s.sector)
        .collect();
    for sector in touched_sectors {
        if let Some(s) = map.sector_mut(sector) {
            s.invalidate_geometry();
        }
    }

    let existing_sides: std::collections::HashSet<ObjectId> = subgraph
        .iter()
        .filter_map(|&l| map.line(l))
        .flat_map(|l| [l.side1, l.side2])
        .flatten()
        .filter(|&s| map.side(s).is_some_and(|side| side.sector != 0))
        .collect();

    let mut edge_set: std::collections::HashSet<DirectedEdge> = std::collections::HashSet::new();
    for &line_id in &subgraph {
        let Some(line) = map.line(line_id) else { continue };
        edge_set.insert((line_id, true));
        let include_back = line.side2.is_some() || (!existing_only && line_midpoint_inside_any_sector(map, line_id));
        if include_back {
            edge_set.insert((line_id, false));
        }
    }

    let seeds: Vec<DirectedEdge> = edge_set.iter().copied().filter(|(l, _)| our_lines.contains(l)).collect();
    let mut visited: std::collections::HashSet<DirectedEdge> = std::collections::HashSet::new();
    let mut reused_sectors: std::collections::HashSet<ObjectId> = std::collections::HashSet::new();
    let mut sector_template: Option<ObjectId> = None;

    for seed in seeds {
        if visited.contains(&seed) {
            continue;
        }
        let Some(traced) = trace_directed_loop(map, seed, &edge_set, &mut visited) else { continue };
        if traced.polygon.len() < 3 {
            continue;
        }

        let all_non_our = traced.edges.iter().all(|(l, _)| !our_lines.contains(l));
        let has_matching_side = traced.edges.iter().any(|&edge| directed_side(map, edge).is_some());
        if existing_only && all_non_our && !has_matching_side {
            continue;
        }

        let assigned: Vec<ObjectId> = traced
            .edges
            .iter()
            .filter_map(|&edge| {
                let side = directed_side(map, edge)?;
                let sector = map.side(side)?.sector;
                (sector != 0).then_some(sector)
            })
            .collect();

        if !assigned.is_empty() && assigned.iter().all(|&s| s == assigned[0]) {
            sector_template.get_or_insert(assigned[0]);
            if let Some(s) = map.sector_mut(assigned[0]) {
                s.polygon = Some(traced.polygon.clone());
            }
            continue;
        }

        let reusable = traced.edges.iter().find_map(|&edge| {
            let side = directed_side(map, edge)?;
            if !existing_sides.contains(&side) {
                return None;
            }
            let sector = map.side(side)?.sector;
            (sector != 0 && !reused_sectors.contains(&sector)).then_some(sector)
        });

        let target_sector = if let Some(sector) = reusable {
            reused_sectors.insert(sector);
            sector
        } else {
            let adjacent = traced.edges.iter().find_map(|&(l, forward)| {
                let line = map.line(l)?;
                let opposite = if forward { line.side2 } else { line.side1 }?;
                let sector = map.side(opposite)?.sector;
                (sector != 0).then_some(sector)
            });
            let template = adjacent.or(sector_template).and_then(|id| map.sector(id)).cloned();
            let game = crate::services::DefaultGameConfig;
            let new_id = if let Some(ref t) = template {
                map.add_sector(t.floor.texture.clone(), t.ceiling.texture.clone())
            } else {
                map.add_sector(game.default_floor_texture(), game.default_ceiling_texture())
            };
            if let Some(t) = template {
                if let Some(s) = map.sector_mut(new_id) {
                    s.floor.height = t.floor.height;
                    s.ceiling.height = t.ceiling.height;
                    s.light = t.light;
                }
            }
            sector_template.get_or_insert(new_id);
            new_id
        };

        if let Some(s) = map.sector_mut(target_sector) {
            s.polygon = Some(traced.polygon.clone());
        }
        for &(l, forward) in &traced.edges {
            assign_loop_side(map, l, forward, target_sector);
        }
    }

    for &line_id in lines {
        let Some(line) = map.line(line_id) else { continue };
        let (s1, s2) = (line.side1, line.side2);
        if let Some(s1) = s1 {
            if !visited.contains(&(line_id, true)) && existing_sides.contains(&s1) {
                reassign_side_sector(map, s1, 0);
                map.remove_side(s1);
                if let Some(l) = map.line_mut(line_id) {
                    l.side1 = None;
                }
            }
        }
        if let Some(s2) = s2 {
            if !visited.contains(&(line_id, false)) && existing_sides.contains(&s2) {
                reassign_side_sector(map, s2, 0);
                map.remove_side(s2);
                if let Some(l) = map.line_mut(line_id) {
                    l.side2 = None;
                }
            }
        }
    }

    for &line_id in lines {
        if map.line(line_id).is_some_and(|l| l.side1.is_none() && l.side2.is_some()) {
            if let Some(l) = map.line_mut(line_id) {
                l.flip();
            }
        }
    }

    apply_side_texture_defaults(map, lines);
    map.remove_detached_sectors();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFormat;

    fn new_map() -> SladeMap {
        SladeMap::new(MapFormat::Doom)
    }

    #[test]
    fn create_vertex_dedups_exact_point_only() {
        let mut map = new_map();
        let a = create_vertex(&mut map, 0.0, 0.0, 4.0);
        let b = create_vertex(&mut map, 0.0, 0.0, 4.0);
        assert_eq!(a, b);
        assert_eq!(map.vertices.len(), 1);

        let c = create_vertex(&mut map, 1.0, 1.0, 4.0);
        assert_ne!(a, c);
        assert_eq!(map.vertices.len(), 2);
    }

    #[test]
    fn create_vertex_rounds_when_not_fractional() {
        let mut map = new_map();
        let id = create_vertex(&mut map, 1.4, 1.6, 0.0);
        let v = map.vertex(id).unwrap();
        assert_eq!((v.x, v.y), (1.0, 2.0));
    }

    #[test]
    fn create_vertex_splits_nearby_line() {
        let mut map = new_map();
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let line = create_line_between(&mut map, v1, v2, false);
        let mid = create_vertex(&mut map, 5.0, 0.0, 1.0);
        assert_eq!(map.line(line).unwrap().v2, mid);
        assert_eq!(map.lines.len(), 2);
    }

    #[test]
    fn create_line_between_avoids_duplicate() {
        let mut map = new_map();
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let l1 = create_line_between(&mut map, v1, v2, false);
        let l2 = create_line_between(&mut map, v2, v1, false);
        assert_eq!(l1, l2);
        assert_eq!(map.lines.len(), 1);
    }

    #[test]
    fn split_line_creates_new_segment_and_preserves_flags() {
        let mut map = new_map();
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let line_id = create_line_between(&mut map, v1, v2, false);
        map.line_mut(line_id).unwrap().flags = 7;
        let mid = map.add_vertex(5.0, 0.0);

        let new_line = split_line(&mut map, line_id, mid);
        assert_eq!(map.lines.len(), 2);
        assert_eq!(map.line(line_id).unwrap().v2, mid);
        assert_eq!(map.line(new_line).unwrap().v1, mid);
        assert_eq!(map.line(new_line).unwrap().v2, v2);
        assert_eq!(map.line(new_line).unwrap().flags, 7);
    }

    #[test]
    fn split_line_shifts_offsets_for_texture_continuity_when_auto_offset_set() {
        let mut map = new_map();
        assert!(map.split_auto_offset);
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let line_id = create_line_between(&mut map, v1, v2, false);
        let sector = map.add_sector("FLOOR", "CEIL");
        let side1 = map.add_side(sector);
        let side2 = map.add_side(sector);
        map.line_mut(line_id).unwrap().side1 = Some(side1);
        map.line_mut(line_id).unwrap().side2 = Some(side2);
        map.side_mut(side1).unwrap().offset_x = 3;
        map.side_mut(side2).unwrap().offset_x = 5;
        let mid = map.add_vertex(4.0, 0.0);

        let new_line = split_line(&mut map, line_id, mid);

        let new_side1 = map.line(new_line).unwrap().side1.unwrap();
        assert_eq!(map.side(new_side1).unwrap().offset_x, 3 + 4);
        let original_side2 = map.line(line_id).unwrap().side2.unwrap();
        assert_eq!(original_side2, side2);
        assert_eq!(map.side(side2).unwrap().offset_x, 5 + 6);
    }

    #[test]
    fn split_line_leaves_offsets_alone_when_auto_offset_disabled() {
        let mut map = new_map();
        map.split_auto_offset = false;
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let line_id = create_line_between(&mut map, v1, v2, false);
        let sector = map.add_sector("FLOOR", "CEIL");
        let side1 = map.add_side(sector);
        map.line_mut(line_id).unwrap().side1 = Some(side1);
        map.side_mut(side1).unwrap().offset_x = 3;
        let mid = map.add_vertex(4.0, 0.0);

        let new_line = split_line(&mut map, line_id, mid);

        let new_side1 = map.line(new_line).unwrap().side1.unwrap();
        assert_eq!(map.side(new_side1).unwrap().offset_x, 3);
    }

    #[test]
    fn merge_vertices_repoints_lines_and_drops_degenerate() {
        let mut map = new_map();
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let v3 = map.add_vertex(10.0, 0.0);
        let shared_line = create_line_between(&mut map, v1, v2, false);
        let degenerate = map.add_line(v3, v2);

        merge_vertices(&mut map, v3, v2);

        assert!(map.vertex(v3).is_none());
        assert!(map.line(degenerate).is_none());
        assert!(map.line(shared_line).is_some());
    }

    #[test]
    fn point_in_polygon_detects_interior_and_exterior() {
        let square = vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        assert!(point_in_polygon(5.0, 5.0, &square));
        assert!(!point_in_polygon(15.0, 5.0, &square));
    }

    #[test]
    fn merge_arch_merges_coincident_vertices_and_drops_degenerate_line() {
        let mut map = new_map();
        let v1 = map.add_vertex(0.0, 0.0);
        let v2 = map.add_vertex(10.0, 0.0);
        let v3 = map.add_vertex(10.02, 0.0);
        let shared_line = create_line_between(&mut map, v1, v2, false);
        let degenerate = map.add_line(v3, v2);

        let survivors = merge_arch(&mut map, &[v2, v3], 4.0);

        // v3 is merged away while processing v2, so the second input
        // vertex no longer exists by the time it's its own turn.
        assert_eq!(survivors, vec![v2]);
        assert!(map.line(degenerate).is_none());
        assert!(map.line(shared_line).is_some());
        assert!(map.vertex(v3).is_none());
    }

    #[test]
    fn merge_arch_splits_crossing_lines_at_their_intersection() {
        let mut map = new_map();
        let a1 = map.add_vertex(0.0, 5.0);
        let a2 = map.add_vertex(10.0, 5.0);
        let b1 = map.add_vertex(5.0, 0.0);
        let b2 = map.add_vertex(5.0, 10.0);
        create_line_between(&mut map, a1, a2, false);
        create_line_between(&mut map, b1, b2, false);

        merge_arch(&mut map, &[a1, b1], 0.0);

        assert!(map.vertex_at_exact(5.0, 5.0).is_some());
        assert_eq!(map.lines.len(), 4);
    }
}
