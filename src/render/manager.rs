use super::{
    bin::{Bin, BinStrategy},
    draw::{self, DrawSink, FrameView, StateCache},
    BinKind, Material, MaterialLibrary, RenderInst, RenderInstKey, RenderInstType,
    XformKey,
};
use crate::config::RenderConfig;
use nalgebra_glm as glm;
use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Collects a frame's render instances into bins, sorts them and walks the
/// bins in order. Instances and transforms live in per frame arenas that
/// `clear` resets; keys from an earlier frame are rejected.
#[derive(Debug)]
pub struct RenderInstManager {
    insts: Vec<RenderInst>,
    xforms: Vec<glm::Mat4>,
    frame: u32,
    bins: [Bin; BinKind::COUNT],
    z_only: Bin,
    enabled: [bool; BinKind::COUNT],
    cam_pos: glm::Vec3,
    reflect_pass: bool,
    warning: Arc<Material>,
}

impl RenderInstManager {
    #[must_use]
    pub fn new(config: &RenderConfig, materials: &MaterialLibrary) -> Self {
        let mut enabled = [true; BinKind::COUNT];
        for kind in &config.disabled_bins {
            enabled[kind.index()] = false;
        }
        Self {
            insts: Vec::new(),
            xforms: Vec::new(),
            frame: 0,
            bins: Default::default(),
            z_only: Bin::default(),
            enabled,
            cam_pos: glm::Vec3::zeros(),
            reflect_pass: false,
            warning: Arc::clone(materials.warning()),
        }
    }

    /// Camera position used for distance sorting. Set before adding.
    pub fn set_cam_pos(&mut self, cam_pos: glm::Vec3) {
        self.cam_pos = cam_pos;
    }

    #[must_use]
    pub const fn cam_pos(&self) -> glm::Vec3 {
        self.cam_pos
    }

    /// Glow is not collected while drawing a reflection
    pub fn set_reflect_pass(&mut self, reflect_pass: bool) {
        self.reflect_pass = reflect_pass;
    }

    #[must_use]
    pub const fn is_reflect_pass(&self) -> bool {
        self.reflect_pass
    }

    /// A disabled bin still collects instances but is skipped by `render`
    pub fn set_bin_enabled(&mut self, kind: BinKind, enabled: bool) {
        self.enabled[kind.index()] = enabled;
    }

    #[must_use]
    pub const fn is_bin_enabled(&self, kind: BinKind) -> bool {
        self.enabled[kind.index()]
    }

    /// Stores a transform for this frame
    #[allow(clippy::cast_possible_truncation)]
    pub fn alloc_xform(&mut self, xform: glm::Mat4) -> XformKey {
        self.xforms.push(xform);
        XformKey {
            index: (self.xforms.len() - 1) as u32,
            frame: self.frame,
        }
    }

    /// # Panics
    /// Will panic if `key` is from an earlier frame
    #[must_use]
    pub fn xform(&self, key: XformKey) -> &glm::Mat4 {
        self.check_xform(key);
        &self.xforms[key.index as usize]
    }

    /// Stores an instance for this frame. It is not drawn until added with
    /// `add_inst`.
    ///
    /// # Panics
    /// Will panic if a transform of `inst` is from an earlier frame
    #[allow(clippy::cast_possible_truncation)]
    pub fn alloc_inst(&mut self, inst: RenderInst) -> RenderInstKey {
        self.check_xform(inst.world_xform);
        self.check_xform(inst.obj_xform);
        self.insts.push(inst);
        RenderInstKey {
            index: (self.insts.len() - 1) as u32,
            frame: self.frame,
        }
    }

    /// # Panics
    /// Will panic if `key` is from an earlier frame
    #[must_use]
    pub fn inst(&self, key: RenderInstKey) -> &RenderInst {
        self.check_inst(key);
        &self.insts[key.index as usize]
    }

    /// # Panics
    /// Will panic if `key` is from an earlier frame
    pub fn inst_mut(&mut self, key: RenderInstKey) -> &mut RenderInst {
        self.check_inst(key);
        &mut self.insts[key.index as usize]
    }

    /// Puts an instance into its bins. A material's bin override wins, then
    /// translucency, then the bin for the instance type. Refracting and
    /// glowing materials are also added to those bins.
    ///
    /// # Panics
    /// Will panic if `key` is from an earlier frame
    pub fn add_inst(&mut self, key: RenderInstKey) {
        self.check_inst(key);
        let inst = &self.insts[key.index as usize];
        let material = inst.material.as_deref();
        let has_glow = material.is_some_and(|m| m.glow)
            && !self.reflect_pass
            && !inst.object_rendered;

        let mut add = |kind: BinKind| {
            self.bins[kind.index()].add(kind.strategy(), key.index, inst, &self.cam_pos);
        };
        if let Some(kind) = material.and_then(|m| m.render_bin) {
            add(kind);
        } else if inst.is_translucent() {
            // Translucent glow is drawn by the glow bin alone
            if !has_glow {
                add(BinKind::Translucent);
            }
        } else {
            let kind = match inst.kind {
                RenderInstType::Begin => BinKind::Begin,
                RenderInstType::Sky => BinKind::Sky,
                RenderInstType::Interior => BinKind::Interior,
                RenderInstType::InteriorDynamicLighting => {
                    BinKind::InteriorDynamicLighting
                }
                RenderInstType::Mesh => BinKind::Mesh,
                RenderInstType::Shadow => BinKind::Shadow,
                RenderInstType::Decal => BinKind::Decal,
                RenderInstType::Water => BinKind::Water,
                RenderInstType::Foliage => BinKind::Foliage,
                RenderInstType::Object | RenderInstType::ObjectTranslucent => {
                    BinKind::MiscObject
                }
            };
            add(kind);
            if matches!(inst.kind, RenderInstType::Interior | RenderInstType::Mesh) {
                self.z_only
                    .add(BinStrategy::ZOnly, key.index, inst, &self.cam_pos);
            }
        }

        if material.is_some_and(|m| m.refract) {
            add(BinKind::Refraction);
        }
        if has_glow {
            add(BinKind::Glow);
        }
    }

    /// Sorts every bin for drawing
    pub fn sort(&mut self) {
        for kind in BinKind::ALL {
            self.bins[kind.index()].sort(kind.strategy());
        }
        self.z_only.sort(BinStrategy::ZOnly);
        trace!(
            "Sorted {} render instances for frame {}",
            self.insts.len(),
            self.frame
        );
    }

    /// Draws the enabled bins in order
    pub fn render(&self, sink: &mut impl DrawSink) {
        let view = self.view();
        let mut cache = StateCache::default();
        for kind in BinKind::ALL {
            if self.enabled[kind.index()] {
                draw::render_bin(
                    &view,
                    kind,
                    &self.bins[kind.index()].elements,
                    sink,
                    &mut cache,
                );
            }
        }
    }

    /// Draws interiors and meshes to depth only
    pub fn render_z_pass(&self, sink: &mut impl DrawSink) {
        let view = self.view();
        let mut cache = StateCache::default();
        draw::render_z_only(&view, &self.z_only.elements, sink, &mut cache);
    }

    /// Drops all instances and transforms and starts the next frame
    pub fn clear(&mut self) {
        self.insts.clear();
        self.xforms.clear();
        for bin in &mut self.bins {
            bin.clear();
        }
        self.z_only.clear();
        self.frame = self.frame.wrapping_add(1);
    }

    #[must_use]
    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    /// Instances in a bin in their current order
    pub fn bin_keys(&self, kind: BinKind) -> impl Iterator<Item = RenderInstKey> + '_ {
        self.keys(&self.bins[kind.index()])
    }

    pub fn z_only_keys(&self) -> impl Iterator<Item = RenderInstKey> + '_ {
        self.keys(&self.z_only)
    }

    fn keys<'a>(&'a self, bin: &'a Bin) -> impl Iterator<Item = RenderInstKey> + 'a {
        bin.elements.iter().map(|e| RenderInstKey {
            index: e.inst,
            frame: self.frame,
        })
    }

    fn view(&self) -> FrameView {
        FrameView {
            insts: &self.insts,
            xforms: &self.xforms,
            warning: &self.warning,
            cam_pos: self.cam_pos,
        }
    }

    fn check_inst(&self, key: RenderInstKey) {
        assert!(
            key.frame == self.frame && (key.index as usize) < self.insts.len(),
            "stale render instance key {key:?}"
        );
    }

    fn check_xform(&self, key: XformKey) {
        assert!(
            key.frame == self.frame && (key.index as usize) < self.xforms.len(),
            "stale transform key {key:?}"
        );
    }
}
