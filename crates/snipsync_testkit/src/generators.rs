//! Property-based test generators using proptest.
//!
//! Provides strategies for generating libraries and edit sequences whose
//! paths are always valid and unique.

use proptest::prelude::*;
use snipsync_protocol::{Library, PathLibrary, PathSnippet};
use std::collections::BTreeMap;

/// Strategy for a single path segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,5}").expect("Invalid regex")
}

/// Strategy for a directory path of depth 0 to 2 (`""` is the root).
pub fn directory_prefix_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 0..3).prop_map(|segments| {
        segments.iter().map(|s| format!("{s}/")).collect::<String>()
    })
}

/// Strategy for a snippet path.
pub fn snippet_path_strategy() -> impl Strategy<Value = String> {
    (directory_prefix_strategy(), segment_strategy())
        .prop_map(|(dir, name)| format!("{dir}{name}.snippet"))
}

/// Strategy for snippet code: a few short lines, sometimes without a
/// trailing newline.
pub fn code_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-z ]{0,12}", 0..6),
        any::<bool>(),
    )
        .prop_map(|(lines, trailing)| {
            let mut code = lines.join("\n");
            if trailing {
                code.push('\n');
            }
            code
        })
}

/// Strategy for a language identifier.
pub fn language_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("text"), Just("rust"), Just("python"), Just("sql")].prop_map(String::from)
}

/// Strategy for a path-addressed library with unique snippet paths.
pub fn path_library_strategy(max_snippets: usize) -> impl Strategy<Value = PathLibrary> {
    prop::collection::btree_map(
        snippet_path_strategy(),
        (code_strategy(), language_strategy()),
        0..=max_snippets,
    )
    .prop_map(|snippets: BTreeMap<String, (String, String)>| PathLibrary {
        snippets: snippets
            .into_iter()
            .map(|(path, (code, language))| PathSnippet {
                name: snippet_name(&path),
                full_path: path,
                code,
                language,
                order: 0,
                create_time: 0,
            })
            .collect(),
        directories: Vec::new(),
    })
}

/// Strategy for a parent-link library with a consistent directory chain.
pub fn library_strategy(max_snippets: usize) -> impl Strategy<Value = Library> {
    path_library_strategy(max_snippets).prop_map(|paths| paths.to_library())
}

/// A single edit a user could make.
#[derive(Debug, Clone)]
pub enum Edit {
    /// Add a snippet at a path, or overwrite it if present.
    Upsert {
        /// Snippet path.
        path: String,
        /// New code.
        code: String,
    },
    /// Delete the n-th snippet (modulo the library size).
    Delete(usize),
}

/// Strategy for an edit.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (snippet_path_strategy(), code_strategy())
            .prop_map(|(path, code)| Edit::Upsert { path, code }),
        1 => any::<usize>().prop_map(Edit::Delete),
    ]
}

/// Applies edits to a path-addressed library.
pub fn apply_edits(library: &mut PathLibrary, edits: &[Edit]) {
    for edit in edits {
        match edit {
            Edit::Upsert { path, code } => {
                match library.snippets.iter_mut().find(|s| &s.full_path == path) {
                    Some(existing) => existing.code = code.clone(),
                    None => library.snippets.push(PathSnippet {
                        full_path: path.clone(),
                        name: snippet_name(path),
                        code: code.clone(),
                        language: "text".to_string(),
                        order: 0,
                        create_time: 0,
                    }),
                }
            }
            Edit::Delete(n) => {
                if !library.snippets.is_empty() {
                    let index = n % library.snippets.len();
                    library.snippets.remove(index);
                }
            }
        }
    }
}

fn snippet_name(path: &str) -> String {
    snipsync_protocol::snippet_name_from_path(path)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snipsync_protocol::is_directory_path;

    proptest! {
        #[test]
        fn generated_paths_are_snippets(path in snippet_path_strategy()) {
            prop_assert!(path.ends_with(".snippet"));
            prop_assert!(!is_directory_path(&path));
            prop_assert!(!path.starts_with('/'));
        }

        #[test]
        fn generated_libraries_are_consistent(library in library_strategy(8)) {
            let paths = library.to_path_library().unwrap();
            prop_assert_eq!(paths.snippets.len(), library.snippets.len());
        }

        #[test]
        fn edits_keep_paths_unique(
            base in path_library_strategy(4),
            edits in prop::collection::vec(edit_strategy(), 0..10),
        ) {
            let mut library = base;
            apply_edits(&mut library, &edits);
            let mut paths: Vec<&str> = library.snippets.iter().map(|s| s.full_path.as_str()).collect();
            let before = paths.len();
            paths.sort();
            paths.dedup();
            prop_assert_eq!(paths.len(), before);
        }
    }
}
