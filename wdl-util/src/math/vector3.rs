use serde::{Deserialize, Serialize};

use super::get_section_cord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vector3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T> Vector3<T> {
    pub const fn new(x: T, y: T, z: T) -> Self {
        Vector3 { x, y, z }
    }
}

impl Vector3<i32> {
    /// Chunk column that contains this block position.
    pub const fn chunk_column(&self) -> (i32, i32) {
        (get_section_cord(self.x), get_section_cord(self.z))
    }
}

impl<T> From<(T, T, T)> for Vector3<T> {
    #[inline(always)]
    fn from((x, y, z): (T, T, T)) -> Self {
        Vector3 { x, y, z }
    }
}
