pub mod anim;
pub mod config;
pub mod detail;
pub mod mw_error;
pub mod node_set;
pub mod render;
pub mod shape;
pub mod transform;
pub mod types;
