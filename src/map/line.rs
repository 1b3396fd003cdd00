use crate::map::object::{MapObject, ObjectHeader, ObjectId};

#[derive(Debug, Clone)]
pub struct Line {
    header: ObjectHeader,
    pub v1: ObjectId,
    pub v2: ObjectId,
    pub side1: Option<ObjectId>,
    pub side2: Option<ObjectId>,
    pub special: i32,
    pub flags: i32,
    pub line_id: i32,
    /// Hexen/UDMF action-special arguments; unused slots stay `0`.
    pub args: [i32; 5],
}

impl Line {
    #[must_use]
    pub fn new(obj_id: ObjectId, index: usize, v1: ObjectId, v2: ObjectId) -> Self {
        Self {
            header: ObjectHeader::new(obj_id, index),
            v1,
            v2,
            side1: None,
            side2: None,
            special: 0,
            flags: 0,
            line_id: 0,
            args: [0; 5],
        }
    }

    pub fn flip(&mut self) {
        std::mem::swap(&mut self.v1, &mut self.v2);
        std::mem::swap(&mut self.side1, &mut self.side2);
        self.set_modified();
    }

    #[must_use]
    pub const fn one_sided(&self) -> bool {
        self.side1.is_some() && self.side2.is_none()
    }
}

impl MapObject for Line {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }
    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }
}
