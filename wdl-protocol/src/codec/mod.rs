pub mod packed_array;
pub mod var_int;
