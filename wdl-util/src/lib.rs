pub mod dimension;
pub mod math;

pub use dimension::Dimension;

/// The minimum number of bits required to give `count` distinct values their own index
#[inline]
pub fn encompassing_bits(count: usize) -> u8 {
    if count <= 1 {
        1
    } else {
        count.ilog2() as u8 + if count.is_power_of_two() { 0 } else { 1 }
    }
}
