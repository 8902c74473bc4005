pub mod vector2;
pub mod vector3;

/// Converts a world coordinate to the corresponding chunk-section coordinate.
pub const fn get_section_cord(coord: i32) -> i32 {
    coord >> 4
}
