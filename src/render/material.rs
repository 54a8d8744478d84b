use super::BinKind;
use crate::mw_error::MwError;
use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

/// Name of the material drawn in place of any that cannot be found
pub const WARNING_MATERIAL: &str = "WarningMaterial";
pub const WARNING_MATERIAL_ID: MaterialId = MaterialId(0);

/// Identity used for sorting and state tracking. Unique within a library.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct MaterialId(pub u32);

/// Render state description of a material. What the passes actually do is
/// up to the `DrawSink`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub name: String,
    #[serde(skip)]
    pub id: MaterialId,
    /// Forces every instance using this material into one bin
    pub render_bin: Option<BinKind>,
    pub translucent: bool,
    pub refract: bool,
    pub glow: bool,
    pub double_sided: bool,
    /// Number of passes, at least 1
    pub passes: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            id: MaterialId::default(),
            render_bin: None,
            translucent: false,
            refract: false,
            glow: false,
            double_sided: false,
            passes: 1,
        }
    }
}

impl Material {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Materials by name, shared by everything that prepares render instances.
/// The warning material always exists and has id 0.
#[derive(Debug)]
pub struct MaterialLibrary {
    cache: Mutex<AHashMap<String, Arc<Material>>>,
    warning: Arc<Material>,
}

impl Default for MaterialLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialLibrary {
    #[must_use]
    pub fn new() -> Self {
        let warning = Arc::new(Material::new(WARNING_MATERIAL));
        let mut cache = AHashMap::new();
        cache.insert(WARNING_MATERIAL.to_string(), Arc::clone(&warning));
        Self {
            cache: Mutex::new(cache),
            warning,
        }
    }

    /// Builds a library from a YAML list of materials
    ///
    /// # Errors
    /// May return `MwError`
    pub fn from_yaml(text: &str) -> Result<Self, MwError> {
        let materials: Vec<Material> = serde_yaml::from_str(text)?;
        let library = Self::new();
        for material in materials {
            library.add(material);
        }
        info!("Loaded {} materials", library.len());
        Ok(library)
    }

    /// Adds or replaces a material and assigns its id
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&self, mut material: Material) -> Arc<Material> {
        let mut cache = self.cache.lock();
        material.passes = material.passes.max(1);
        material.id = cache
            .get(&material.name)
            .map_or(MaterialId(cache.len() as u32), |m| m.id);
        let material = Arc::new(material);
        cache.insert(material.name.clone(), Arc::clone(&material));
        material
    }

    /// Looks up a material by name, substituting the warning material for
    /// one that does not exist
    #[must_use]
    pub fn resolve(&self, name: &str) -> Arc<Material> {
        if let Some(material) = self.cache.lock().get(name) {
            return Arc::clone(material);
        }
        warn!("Material {name} not found, using {WARNING_MATERIAL}");
        Arc::clone(&self.warning)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Material>> {
        self.cache.lock().get(name).cloned()
    }

    #[must_use]
    pub fn warning(&self) -> &Arc<Material> {
        &self.warning
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Never true since the warning material is always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}
