//! Generated-code preview for the entry under the cursor.
//!
//! The entry is merged with the schema defaults (and, for a definition, with
//! its declaration and target extension) and rendered through the generator's
//! own templates.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};
use tslgen_schema::{SchemaDefaults, extend, fields};
use tslgen_yaml::{Document, Node, parse_stream};

use crate::profile::{DATA_FILE_EXTENSION, GeneratorProfile};
use crate::project::{DataFileKind, ProjectSpecs};

const EXTENSION_TEMPLATE: &str = "extension";
const DECLARATION_TEMPLATE: &str = "primitive_declaration";
const DEFINITION_TEMPLATE: &str = "primitive_definition";

/// Rendered preview, as sent to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    /// Output that does not depend on a C type.
    pub static_content: String,
    /// One rendering per C type of the selected definition.
    pub variable_content: Vec<RenderedVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedVariant {
    pub content: String,
    pub ctype: Option<String>,
}

/// A preview plus the rendering problems to show to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    pub data: PreviewData,
    pub messages: Vec<String>,
}

/// Why nothing could be rendered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    #[error("No primitive or extension selected.")]
    NothingSelected,

    #[error("Please specify a ctype.")]
    MissingCtype,

    #[error("Please specify an extension.")]
    MissingExtension,
}

/// Template environment of one project.
pub struct Templates {
    env: Environment<'static>,
    profile: GeneratorProfile,
}

impl Templates {
    /// Templates below the project's template folder. `core/extension`
    /// resolves to `<template folder>/core/extension.template`.
    pub fn new(specs: &ProjectSpecs) -> Self {
        let load = minijinja::path_loader(&specs.template_folder);
        let extension = specs.profile.template_extension;
        let mut env = Environment::new();
        env.set_loader(move |name| load(&format!("{name}.{extension}")));
        Templates {
            env,
            profile: specs.profile,
        }
    }

    fn render(&self, name: &str, context: &Map<String, Json>) -> Result<String, minijinja::Error> {
        let template = self.env.get_template(&self.profile.template_name(name))?;
        template.render(context)
    }

    fn render_inline(&self, source: &str, context: &Map<String, Json>) -> Result<String, minijinja::Error> {
        self.env.render_str(source, context)
    }
}

/// Preview of the entry at byte `offset` of `text`.
pub fn render_preview(
    specs: &ProjectSpecs,
    defaults: &SchemaDefaults,
    text: &str,
    offset: usize,
) -> Result<Preview, PreviewError> {
    let stream = parse_stream(text);
    let kind = DataFileKind::from_content(&stream);
    let (_, document) = stream
        .document_at(offset)
        .ok_or(PreviewError::NothingSelected)?;
    let templates = Templates::new(specs);
    let mut preview = Preview::default();

    match kind {
        DataFileKind::Extension => {
            let mut data = object(document.to_json());
            extend(&mut data, &defaults.extension);
            preview.data.static_content =
                preview.render(&templates, EXTENSION_TEMPLATE, &data);
        }
        DataFileKind::Primitive => {
            let mut declaration = declaration_of(document);
            extend(&mut declaration, &defaults.primitive_declaration);

            match selected_definition(document, offset) {
                None => {
                    preview.data.static_content =
                        preview.render(&templates, DECLARATION_TEMPLATE, &declaration);
                }
                Some(definition) => {
                    preview.data.variable_content = render_definition(
                        &mut preview,
                        &templates,
                        specs,
                        defaults,
                        definition,
                        &declaration,
                    )?;
                }
            }
        }
        DataFileKind::Unknown => return Err(PreviewError::NothingSelected),
    }
    Ok(preview)
}

/// The primitive and extension a build should generate and test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub primitive: String,
    pub extension: String,
}

/// Build target for the definition at byte `offset` of `text`.
pub fn build_target(text: &str, offset: usize) -> Result<BuildTarget, PreviewError> {
    let stream = parse_stream(text);
    let (_, document) = stream
        .document_at(offset)
        .ok_or(PreviewError::NothingSelected)?;
    let primitive = document
        .get(fields::PRIMITIVE_NAME)
        .and_then(Node::as_str)
        .ok_or(PreviewError::NothingSelected)?;
    let definition = selected_definition(document, offset).ok_or(PreviewError::NothingSelected)?;
    let extension = target_extension(definition).ok_or(PreviewError::MissingExtension)?;
    Ok(BuildTarget {
        primitive: primitive.to_string(),
        extension,
    })
}

impl Preview {
    /// Render a named template, recording a failure as a message.
    fn render(&mut self, templates: &Templates, name: &str, data: &Map<String, Json>) -> String {
        templates.render(name, data).unwrap_or_else(|e| {
            warn!(template = name, error = %e, "Preview rendering failed");
            self.messages
                .push(format!("Error while rendering preview: {e:#}"));
            String::new()
        })
    }
}

/// The primitive without its definitions, with `functor_name` falling back
/// to `primitive_name`.
fn declaration_of(document: &Document) -> Map<String, Json> {
    let mut data = object(document.to_json());
    if !data.contains_key(fields::FUNCTOR_NAME) {
        let name = data.get(fields::PRIMITIVE_NAME).map(display).unwrap_or_default();
        data.insert(fields::FUNCTOR_NAME.to_string(), Json::String(name));
    }
    data.remove(fields::DEFINITIONS);
    data
}

fn selected_definition(document: &Document, offset: usize) -> Option<&Node> {
    document
        .get(fields::DEFINITIONS)?
        .as_sequence()?
        .iter()
        .find(|definition| definition.span.start <= offset && offset <= definition.span.end)
}

/// The first extension a definition targets.
fn target_extension(definition: &Node) -> Option<String> {
    definition
        .get(fields::TARGET_EXTENSION)?
        .string_list()
        .into_iter()
        .next()
}

fn render_definition(
    preview: &mut Preview,
    templates: &Templates,
    specs: &ProjectSpecs,
    defaults: &SchemaDefaults,
    definition: &Node,
    declaration: &Map<String, Json>,
) -> Result<Vec<RenderedVariant>, PreviewError> {
    let ctypes = definition
        .get(fields::CTYPE)
        .map(Node::string_list)
        .filter(|ctypes| !ctypes.is_empty())
        .ok_or(PreviewError::MissingCtype)?;
    let extension_name = target_extension(definition).ok_or(PreviewError::MissingExtension)?;

    let mut definition_data = object(definition.to_json());
    let flags = definition
        .get(fields::LSCPU_FLAGS)
        .map(|flags| flags.string_list().join(", "))
        .unwrap_or_default();
    definition_data.insert(fields::LSCPU_FLAGS.to_string(), Json::String(flags));

    let mut extension_data = match find_extension(&specs.extensions_folder, &extension_name) {
        Some(data) => data,
        None => {
            preview
                .messages
                .push(format!("Could not find an extension {extension_name}."));
            Map::new()
        }
    };
    extend(&mut extension_data, &defaults.extension);
    extend(&mut extension_data, declaration);

    let mut merged = definition_data;
    extend(&mut merged, &defaults.primitive_definition);
    extend(&mut merged, &extension_data);

    let implementation = merged
        .get(fields::IMPLEMENTATION)
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();

    let mut variants = Vec::with_capacity(ctypes.len());
    for ctype in ctypes {
        let mut data = merged.clone();
        data.insert(fields::CTYPE.to_string(), Json::String(ctype.clone()));

        let rendered = templates
            .render_inline(&implementation, &data)
            .unwrap_or_else(|e| {
                preview
                    .messages
                    .push(format!("Could not render template for type {ctype}: {e:#}"));
                String::new()
            });
        data.insert(fields::IMPLEMENTATION.to_string(), Json::String(rendered));

        variants.push(RenderedVariant {
            content: preview.render(templates, DEFINITION_TEMPLATE, &data),
            ctype: Some(ctype),
        });
    }
    Ok(variants)
}

/// The extension document named `name` below the extension data folder.
fn find_extension(folder: &Path, name: &str) -> Option<Map<String, Json>> {
    let pattern = folder.join("**").join(format!("*.{DATA_FILE_EXTENSION}"));
    let paths = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| {
            warn!(error = %e, "Invalid extension search pattern");
            e
        })
        .ok()?;

    for path in paths.flatten() {
        let Ok(text) = std::fs::read_to_string(&path) else {
            debug!(?path, "Skipping unreadable extension file");
            continue;
        };
        let stream = parse_stream(&text);
        let found = stream.documents.iter().find(|document| {
            document
                .get(fields::EXTENSION_NAME)
                .and_then(Node::as_str)
                .is_some_and(|candidate| candidate == name)
        });
        if let Some(document) = found {
            debug!(?path, extension = name, "Found extension document");
            return Some(object(document.to_json()));
        }
    }
    None
}

fn object(json: Json) -> Map<String, Json> {
    match json {
        Json::Object(map) => map,
        _ => Map::new(),
    }
}

/// Scalar text the way templates see it.
fn display(json: &Json) -> String {
    match json {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        specs: ProjectSpecs,
        defaults: SchemaDefaults,
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let specs = ProjectSpecs::for_root(dir.path(), GeneratorProfile::TSL);
        let core = specs.template_folder.join("core");
        write(
            &core.join("extension.template"),
            "ext {{ extension_name }} in {{ tsl_namespace }} ({{ arch }})",
        );
        write(
            &core.join("primitive_declaration.template"),
            "decl {{ functor_name }}/{{ primitive_name }}",
        );
        write(
            &core.join("primitive_definition.template"),
            "def {{ functor_name }}<{{ ctype }}, {{ extension_name }}> [{{ lscpu_flags }}] {{ implementation }}",
        );
        write(
            &specs.extensions_folder.join("simd/x86/avx2.yaml"),
            "---\nextension_name: sse\n...\n---\nextension_name: avx2\narch: x86\n...\n",
        );

        let mut defaults = SchemaDefaults::default();
        defaults.extension.insert("arch".into(), json!("unknown"));
        defaults.extension.insert("tsl_namespace".into(), json!("tsl"));
        defaults.primitive_declaration.insert("tsl_namespace".into(), json!("tsl"));
        defaults.primitive_definition.insert("lscpu_flags".into(), json!(""));

        Fixture {
            _dir: dir,
            specs,
            defaults,
        }
    }

    const PRIMITIVE: &str = "\
primitive_name: add
definitions:
  - target_extension: avx2
    ctype: [int32_t, float]
    lscpu_flags: [avx2, avx]
    implementation: \"return a + b; // {{ ctype }}\"
  - target_extension: avx2
";

    #[test]
    fn test_extension_preview_uses_defaults() {
        let f = fixture();
        let preview = render_preview(&f.specs, &f.defaults, "extension_name: neon\n", 0).unwrap();
        assert_eq!(preview.data.static_content, "ext neon in tsl (unknown)");
        assert!(preview.data.variable_content.is_empty());
        assert!(preview.messages.is_empty());
    }

    #[test]
    fn test_declaration_outside_definitions() {
        let f = fixture();
        let preview = render_preview(&f.specs, &f.defaults, PRIMITIVE, 3).unwrap();
        assert_eq!(preview.data.static_content, "decl add/add");
    }

    #[test]
    fn test_definition_renders_one_variant_per_ctype() {
        let f = fixture();
        let offset = PRIMITIVE.find("ctype").unwrap();
        let preview = render_preview(&f.specs, &f.defaults, PRIMITIVE, offset).unwrap();
        assert!(preview.messages.is_empty(), "{:?}", preview.messages);
        let variants: Vec<_> = preview
            .data
            .variable_content
            .iter()
            .map(|v| (v.ctype.as_deref().unwrap(), v.content.as_str()))
            .collect();
        assert_eq!(
            variants,
            vec![
                ("int32_t", "def add<int32_t, avx2> [avx2, avx] return a + b; // int32_t"),
                ("float", "def add<float, avx2> [avx2, avx] return a + b; // float"),
            ]
        );
    }

    #[test]
    fn test_definition_without_ctype() {
        let f = fixture();
        let offset = PRIMITIVE.rfind("target_extension").unwrap();
        assert_eq!(
            render_preview(&f.specs, &f.defaults, PRIMITIVE, offset),
            Err(PreviewError::MissingCtype)
        );
    }

    #[test]
    fn test_definition_without_extension() {
        let f = fixture();
        let text = "primitive_name: add\ndefinitions:\n  - ctype: int8_t\n";
        let offset = text.find("ctype").unwrap();
        let error = render_preview(&f.specs, &f.defaults, text, offset).unwrap_err();
        assert_eq!(error.to_string(), "Please specify an extension.");
    }

    #[test]
    fn test_unknown_extension_and_broken_template_become_messages() {
        let f = fixture();
        let text = "primitive_name: add\ndefinitions:\n  - target_extension: neon\n    ctype: int8_t\n    implementation: \"{{ broken\"\n";
        let offset = text.find("ctype").unwrap();
        let preview = render_preview(&f.specs, &f.defaults, text, offset).unwrap();
        assert_eq!(preview.messages.len(), 2, "{:?}", preview.messages);
        assert_eq!(preview.messages[0], "Could not find an extension neon.");
        assert!(preview.messages[1].starts_with("Could not render template for type int8_t"));
        assert_eq!(preview.data.variable_content.len(), 1);
    }

    #[test]
    fn test_build_target() {
        let offset = PRIMITIVE.find("lscpu_flags").unwrap();
        assert_eq!(
            build_target(PRIMITIVE, offset),
            Ok(BuildTarget {
                primitive: "add".into(),
                extension: "avx2".into(),
            })
        );
        assert_eq!(build_target(PRIMITIVE, 0), Err(PreviewError::NothingSelected));
        let text = "primitive_name: add\ndefinitions:\n  - ctype: int8_t\n";
        assert_eq!(
            build_target(text, text.find("ctype").unwrap()),
            Err(PreviewError::MissingExtension)
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let data = PreviewData {
            static_content: "x".into(),
            variable_content: vec![RenderedVariant {
                content: "y".into(),
                ctype: Some("float".into()),
            }],
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"staticContent": "x", "variableContent": [{"content": "y", "ctype": "float"}]})
        );
    }
}
