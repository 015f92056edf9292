//! Property tests for field completions.

use proptest::prelude::*;
use tslgen_lsp::completion::{SuggestionKind, complete};
use tslgen_lsp::project::DataFileKind;
use tslgen_schema::{Cardinality, ObjectShape, ScalarType, SchemaNode};
use tslgen_yaml::LinePosition;

fn shape(keys: &[String]) -> ObjectShape {
    keys.iter()
        .map(|key| {
            (
                key.clone(),
                SchemaNode::scalar(ScalarType::String, Cardinality::OPTIONAL),
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn offered_fields_are_schema_minus_siblings(
        keys in prop::collection::btree_set("[a-z]{1,6}", 1..8),
        present in prop::collection::vec(any::<bool>(), 8),
        cursor_slot in 0usize..8,
    ) {
        let keys: Vec<String> = keys.into_iter().map(|key| format!("f_{key}")).collect();
        let schema = ObjectShape::new().with(
            "entry",
            SchemaNode::object(shape(&keys), Cardinality::REQUIRED),
        );
        let siblings: Vec<&String> = keys
            .iter()
            .zip(&present)
            .filter(|(_, present)| **present)
            .map(|(key, _)| key)
            .collect();

        let mut lines = vec!["entry:".to_string()];
        let cursor = 1 + cursor_slot.min(siblings.len());
        lines.extend(siblings.iter().map(|key| format!("  {key}: x")));
        lines.insert(cursor, "  ".to_string());
        let text = lines.join("\n");

        let suggestions = complete(
            &text,
            LinePosition::new(cursor as u32, 2),
            &schema,
            DataFileKind::Extension,
            "  ",
        );

        prop_assert!(suggestions.iter().all(|s| s.kind == SuggestionKind::Field));
        let offered: Vec<String> = suggestions
            .iter()
            .map(|s| s.label.trim_end_matches(':').to_string())
            .collect();
        let expected: Vec<String> = keys
            .iter()
            .filter(|key| !siblings.contains(key))
            .cloned()
            .collect();
        prop_assert_eq!(offered, expected);
    }
}
