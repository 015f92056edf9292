//! Generator projects: discovery from a data file and per-root state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};
use tslgen_schema::{SchemaDefaults, SchemaError, Schemata, fields, parse_schemata};
use tslgen_yaml::Stream;

use crate::profile::{DATA_FOLDER, EXTENSIONS_FOLDER, GeneratorProfile, PRIMITIVES_FOLDER};

/// What a data file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFileKind {
    Primitive,
    Extension,
    Unknown,
}

impl DataFileKind {
    /// Kind by the data folder the file lives in.
    pub fn from_location(path: &Path) -> Self {
        for folder in path.ancestors().skip(1) {
            match folder.file_name().and_then(|name| name.to_str()) {
                Some(PRIMITIVES_FOLDER) => return DataFileKind::Primitive,
                Some(EXTENSIONS_FOLDER) => return DataFileKind::Extension,
                _ => {}
            }
        }
        DataFileKind::Unknown
    }

    /// Kind by the first document naming a primitive or an extension.
    pub fn from_content(stream: &Stream) -> Self {
        for document in &stream.documents {
            if document.has(fields::PRIMITIVE_NAME) {
                return DataFileKind::Primitive;
            }
            if document.has(fields::EXTENSION_NAME) {
                return DataFileKind::Extension;
            }
        }
        DataFileKind::Unknown
    }

    pub fn name(self) -> &'static str {
        match self {
            DataFileKind::Primitive => "primitive",
            DataFileKind::Extension => "extension",
            DataFileKind::Unknown => "unknown",
        }
    }
}

/// Locations of one generator project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpecs {
    pub profile: GeneratorProfile,
    pub root: PathBuf,
    pub data_folder: PathBuf,
    pub primitives_folder: PathBuf,
    pub extensions_folder: PathBuf,
    pub schema_file: PathBuf,
    pub template_folder: PathBuf,
}

impl ProjectSpecs {
    /// Find the project a data file belongs to.
    ///
    /// The file has to live below `<root>/primitive_data/{primitives,extensions}`
    /// and the root has to carry the schema file of one of the profiles.
    pub fn discover(file: &Path) -> Option<Self> {
        let data_kind_folder = file.ancestors().skip(1).find(|folder| {
            matches!(
                folder.file_name().and_then(|name| name.to_str()),
                Some(PRIMITIVES_FOLDER | EXTENSIONS_FOLDER)
            )
        })?;
        let data_folder = data_kind_folder.parent()?;
        if data_folder.file_name().and_then(|name| name.to_str()) != Some(DATA_FOLDER) {
            debug!(?file, "Data folder is not a generator data folder");
            return None;
        }
        let root = data_folder.parent()?;

        let profile = GeneratorProfile::ALL
            .into_iter()
            .find(|profile| profile.schema_file(root).is_file())?;
        Some(Self::for_root(root, profile))
    }

    /// Specs of `root` under `profile`, without checking the file system.
    pub fn for_root(root: &Path, profile: GeneratorProfile) -> Self {
        let data_folder = root.join(DATA_FOLDER);
        ProjectSpecs {
            profile,
            root: root.to_path_buf(),
            primitives_folder: data_folder.join(PRIMITIVES_FOLDER),
            extensions_folder: data_folder.join(EXTENSIONS_FOLDER),
            data_folder,
            schema_file: profile.schema_file(root),
            template_folder: profile.template_folder(root),
        }
    }
}

/// Errors while loading a project.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema {}: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("{} is not an initialized generator project", .0.display())]
    Unknown(PathBuf),
}

/// Schema trees of a project with the defaults derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSchema {
    pub schemata: Schemata,
    pub defaults: SchemaDefaults,
}

impl ProjectSchema {
    fn new(schemata: Schemata, profile: &GeneratorProfile) -> Self {
        let defaults =
            SchemaDefaults::from_schemata(&schemata, profile.namespace_key, profile.namespace);
        ProjectSchema { schemata, defaults }
    }
}

/// An initialized generator project.
#[derive(Debug)]
pub struct Project {
    pub specs: ProjectSpecs,
    schema: RwLock<Arc<ProjectSchema>>,
}

impl Project {
    async fn load(specs: ProjectSpecs) -> Result<Self, ProjectError> {
        let schema = read_schema(&specs).await?;
        info!(root = ?specs.root, profile = specs.profile.name, "Initialized generator project");
        Ok(Project {
            specs,
            schema: RwLock::new(Arc::new(schema)),
        })
    }

    /// The current schema. Callers keep a consistent snapshot even across a
    /// reload.
    pub async fn schema(&self) -> Arc<ProjectSchema> {
        self.schema.read().await.clone()
    }

    /// Re-read the schema source. On failure the current schema stays.
    pub async fn reload_schema(&self) -> Result<(), ProjectError> {
        let schema = read_schema(&self.specs).await?;
        *self.schema.write().await = Arc::new(schema);
        info!(root = ?self.specs.root, "Reloaded schema");
        Ok(())
    }
}

async fn read_schema(specs: &ProjectSpecs) -> Result<ProjectSchema, ProjectError> {
    let path = &specs.schema_file;
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ProjectError::Io {
            path: path.clone(),
            source,
        })?;
    let schemata = parse_schemata(&source).map_err(|source| ProjectError::Schema {
        path: path.clone(),
        source,
    })?;
    Ok(ProjectSchema::new(schemata, &specs.profile))
}

type ProjectCell = Arc<OnceCell<Arc<Project>>>;

/// Initialized projects by root folder.
///
/// Concurrent requests for the same root share one initialization. A failed
/// initialization leaves the root uninitialized, so the next request retries.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: Mutex<HashMap<PathBuf, ProjectCell>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The project for `specs.root`, initializing it on first use.
    pub async fn get_or_init(&self, specs: &ProjectSpecs) -> Result<Arc<Project>, ProjectError> {
        let cell = {
            let mut projects = self.projects.lock().await;
            projects.entry(specs.root.clone()).or_default().clone()
        };
        let project = cell
            .get_or_try_init(|| async { Project::load(specs.clone()).await.map(Arc::new) })
            .await?;
        Ok(project.clone())
    }

    /// The project a data file belongs to, if it has one and it loads.
    pub async fn project_for(&self, file: &Path) -> Option<Arc<Project>> {
        let specs = ProjectSpecs::discover(file)?;
        match self.get_or_init(&specs).await {
            Ok(project) => Some(project),
            Err(e) => {
                warn!(root = ?specs.root, error = %e, "Could not initialize generator project");
                None
            }
        }
    }

    /// An already initialized project.
    pub async fn get(&self, root: &Path) -> Option<Arc<Project>> {
        let projects = self.projects.lock().await;
        projects.get(root)?.get().cloned()
    }

    /// All initialized projects.
    pub async fn projects(&self) -> Vec<Arc<Project>> {
        let projects = self.projects.lock().await;
        projects.values().filter_map(|cell| cell.get().cloned()).collect()
    }

    /// Replace the schema of an initialized project.
    pub async fn reload_schema(&self, root: &Path) -> Result<(), ProjectError> {
        let project = self
            .get(root)
            .await
            .ok_or_else(|| ProjectError::Unknown(root.to_path_buf()))?;
        project.reload_schema().await
    }
}
