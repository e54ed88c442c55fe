pub mod rect;
pub mod vec2;
