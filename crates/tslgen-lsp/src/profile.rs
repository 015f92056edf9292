//! Generator profiles.
//!
//! The TSL and TVL generators share the same project layout and data-file
//! vocabulary; they differ only in a handful of names. A [`GeneratorProfile`]
//! captures those names so one engine serves both.

use std::path::{Path, PathBuf};

/// Folder below the project root that holds all data files.
pub const DATA_FOLDER: &str = "primitive_data";
/// Data folder for primitive files.
pub const PRIMITIVES_FOLDER: &str = "primitives";
/// Data folder for extension files.
pub const EXTENSIONS_FOLDER: &str = "extensions";
/// File extension of data files.
pub const DATA_FILE_EXTENSION: &str = "yaml";

const CONFIG_FOLDER: &str = "generator/config/generator";

/// Naming profile of one generator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorProfile {
    /// Short lowercase name, e.g. `tsl`.
    pub name: &'static str,
    /// Key added to extension and declaration defaults.
    pub namespace_key: &'static str,
    /// Value stored under [`Self::namespace_key`].
    pub namespace: &'static str,
    /// Template namespace holding the preview templates.
    pub template_namespace: &'static str,
    /// File extension of template files, without the dot.
    pub template_extension: &'static str,
    /// Generator entry script, relative to the project root.
    pub entry_script: &'static str,
    /// Scratch folder for daemon builds, relative to the project root.
    pub build_dir: &'static str,
}

impl GeneratorProfile {
    pub const TSL: GeneratorProfile = GeneratorProfile {
        name: "tsl",
        namespace_key: "tsl_namespace",
        namespace: "tsl",
        template_namespace: "core",
        template_extension: "template",
        entry_script: "main.py",
        build_dir: ".tslgenEdit-temp",
    };

    pub const TVL: GeneratorProfile = GeneratorProfile {
        name: "tvl",
        namespace_key: "tvl_namespace",
        namespace: "tvl",
        template_namespace: "core",
        template_extension: "template",
        entry_script: "main.py",
        build_dir: ".tslgenEdit-temp",
    };

    /// Profiles in the order they are tried.
    pub const ALL: [GeneratorProfile; 2] = [GeneratorProfile::TSL, GeneratorProfile::TVL];

    /// `<root>/generator/config/generator/<name>_generator_schema.yaml`
    pub fn schema_file(&self, root: &Path) -> PathBuf {
        root.join(CONFIG_FOLDER)
            .join(format!("{}_generator_schema.yaml", self.name))
    }

    /// `<root>/generator/config/generator/<name>_templates`
    pub fn template_folder(&self, root: &Path) -> PathBuf {
        root.join(CONFIG_FOLDER).join(format!("{}_templates", self.name))
    }

    /// Template name for a template of the profile's namespace, e.g.
    /// `core/extension`.
    pub fn template_name(&self, name: &str) -> String {
        format!("{}/{}", self.template_namespace, name)
    }
}
