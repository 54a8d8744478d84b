mod bin;
mod draw;
mod instance;
mod manager;
mod material;
mod prep;

// Re-export
pub use bin::{BinKind, BinStrategy};
pub use draw::{DrawConstants, DrawSink};
pub use instance::{RenderInst, RenderInstKey, RenderInstType, XformKey};
pub use manager::RenderInstManager;
pub use material::{
    Material, MaterialId, MaterialLibrary, WARNING_MATERIAL, WARNING_MATERIAL_ID,
};
