use crate::map::object::{MapObject, ObjectHeader, ObjectId};

#[derive(Debug, Clone)]
pub struct Plane {
    pub height: f64,
    pub texture: String,
}

impl Plane {
    #[must_use]
    pub fn new(height: f64, texture: impl Into<String>) -> Self {
        Self { height, texture: texture.into() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

#[derive(Debug, Clone)]
pub struct Sector {
    header: ObjectHeader,
    pub floor: Plane,
    pub ceiling: Plane,
    pub light: i32,
    pub special: i32,
    pub id: i32,
    pub connected_sides: Vec<ObjectId>,
    /// Cached axis-aligned bounds; invalidated by `SladeMap` whenever a
    /// bounding line's vertex moves.
    pub bbox: Option<BBox>,
    /// Cached closed polygon (vertex coordinates), same invalidation rule.
    pub polygon: Option<Vec<(f64, f64)>>,
}

impl Sector {
    #[must_use]
    pub fn new(obj_id: ObjectId, index: usize, floor_tex: impl Into<String>, ceiling_tex: impl Into<String>) -> Self {
        Self {
            header: ObjectHeader::new(obj_id, index),
            floor: Plane::new(0.0, floor_tex),
            ceiling: Plane::new(0.0, ceiling_tex),
            light: 160,
            special: 0,
            id: 0,
            connected_sides: Vec::new(),
            bbox: None,
            polygon: None,
        }
    }

    pub fn invalidate_geometry(&mut self) {
        self.bbox = None;
        self.polygon = None;
    }
}

impl MapObject for Sector {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }
    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }
}
