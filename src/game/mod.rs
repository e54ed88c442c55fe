pub mod constants;
pub mod mode;
pub mod objects;
pub mod world;
