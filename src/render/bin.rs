use super::{RenderInst, WARNING_MATERIAL_ID};
use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};

/// Render bins in the order they are drawn
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BinKind {
    Begin,
    Sky,
    SkyShape,
    Interior,
    InteriorDynamicLighting,
    Mesh,
    Shadow,
    MiscObject,
    Decal,
    Refraction,
    Water,
    Foliage,
    Translucent,
    TranslucentPreGlow,
    Glow,
}

impl BinKind {
    pub const COUNT: usize = 15;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Begin,
        Self::Sky,
        Self::SkyShape,
        Self::Interior,
        Self::InteriorDynamicLighting,
        Self::Mesh,
        Self::Shadow,
        Self::MiscObject,
        Self::Decal,
        Self::Refraction,
        Self::Water,
        Self::Foliage,
        Self::Translucent,
        Self::TranslucentPreGlow,
        Self::Glow,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// How instances in this bin are sorted and drawn
    #[must_use]
    pub const fn strategy(self) -> BinStrategy {
        match self {
            Self::Begin
            | Self::Sky
            | Self::Shadow
            | Self::MiscObject
            | Self::Decal
            | Self::Water
            | Self::Foliage => BinStrategy::Object,
            Self::SkyShape | Self::Translucent | Self::TranslucentPreGlow => {
                BinStrategy::Translucent
            }
            Self::Interior | Self::InteriorDynamicLighting => BinStrategy::Interior,
            Self::Mesh => BinStrategy::Mesh,
            Self::Refraction => BinStrategy::Refract,
            Self::Glow => BinStrategy::Glow,
        }
    }
}

/// Sorting and drawing behaviour shared by groups of bins
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinStrategy {
    /// Submission order
    Object,
    /// Material then vertex buffer, with lightmaps and dynamic lights
    Interior,
    /// Material then vertex buffer
    Mesh,
    /// Far to near then material, no lightmaps or cubemaps
    Translucent,
    /// Material then vertex buffer after capturing the back buffer
    Refract,
    Glow,
    /// Depth only, vertex buffer then primitive buffer
    ZOnly,
}

impl BinStrategy {
    #[must_use]
    pub const fn sorts(self) -> bool {
        !matches!(self, Self::Object)
    }

    /// Primary and secondary sort keys of an instance
    #[must_use]
    pub fn keys(self, inst: &RenderInst, cam_pos: &glm::Vec3) -> (u32, u32) {
        let material = inst
            .material
            .as_ref()
            .map_or(WARNING_MATERIAL_ID, |m| m.id)
            .0;
        match self {
            Self::Object => (0, 0),
            Self::Interior | Self::Mesh | Self::Refract | Self::Glow => {
                (material, inst.vertex_buffer.0)
            }
            Self::Translucent => {
                // Non-negative floats order the same as their bits
                let dist = glm::distance(cam_pos, &inst.sort_point);
                (u32::MAX - dist.to_bits(), material)
            }
            Self::ZOnly => (inst.vertex_buffer.0, inst.primitive_buffer.0),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SortElem {
    pub(crate) inst: u32,
    key: u32,
    key2: u32,
}

/// Instances collected for one bin this frame
#[derive(Debug, Default)]
pub(crate) struct Bin {
    pub(crate) elements: Vec<SortElem>,
}

impl Bin {
    pub(crate) fn add(
        &mut self,
        strategy: BinStrategy,
        index: u32,
        inst: &RenderInst,
        cam_pos: &glm::Vec3,
    ) {
        let (key, key2) = strategy.keys(inst, cam_pos);
        self.elements.push(SortElem {
            inst: index,
            key,
            key2,
        });
    }

    /// Stable, so equal keys stay in submission order
    pub(crate) fn sort(&mut self, strategy: BinStrategy) {
        if strategy.sorts() {
            self.elements.sort_by_key(|e| (e.key, e.key2));
        }
    }

    pub(crate) fn clear(&mut self) {
        self.elements.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{BinKind, BinStrategy};

    #[test]
    fn all_in_index_order() {
        for (i, kind) in BinKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn strategies() {
        assert_eq!(BinKind::SkyShape.strategy(), BinStrategy::Translucent);
        assert_eq!(BinKind::Foliage.strategy(), BinStrategy::Object);
        assert!(!BinStrategy::Object.sorts());
        assert!(BinStrategy::ZOnly.sorts());
    }
}
