//! Edits confined to the server-registration section of a client document.
//!
//! Everything outside the section is carried through untouched, including
//! key order, because documents are parsed with order preservation.

use super::{SectionPath, SyncDomainError};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Change to apply to a client's server-registration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionEdit {
    /// Write every desired entry and drop entries for retired ids.
    ///
    /// Keys that are neither desired nor retired belong to the user and are
    /// left alone.
    Reconcile {
        /// Entries keyed by server id, in publication order.
        desired: Vec<(String, Value)>,
        /// Ids removed from the registry.
        retired: BTreeSet<String>,
    },
    /// Insert an entry unless the key is already present.
    Add {
        /// Server id.
        key: String,
        /// Rendered entry.
        entry: Value,
    },
    /// Remove an entry if present.
    Remove {
        /// Server id.
        key: String,
    },
}

/// What a removal does with a section it leaves empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptiedSection {
    /// Leave the empty object in place; the user had it before any edit.
    Keep,
    /// Remove the section key; it only exists because an edit created it.
    Drop,
}

/// Reports whether the section at `path` is present in the document.
#[must_use]
pub fn has_section(document: &Value, path: &SectionPath) -> bool {
    path.segments()
        .iter()
        .try_fold(document, |current, segment| current.get(segment))
        .is_some()
}

/// Parses a client document, treating a missing or blank file as `{}`.
///
/// # Errors
///
/// Returns [`SyncDomainError::CorruptDocument`] when the content is not JSON
/// or its top level is not an object.
pub fn parse_document(contents: Option<&str>) -> Result<Value, SyncDomainError> {
    let Some(text) = contents.filter(|text| !text.trim().is_empty()) else {
        return Ok(Value::Object(Map::new()));
    };
    let document: Value = serde_json::from_str(text)
        .map_err(|err| SyncDomainError::CorruptDocument(format!("not valid JSON: {err}")))?;
    if !document.is_object() {
        return Err(SyncDomainError::CorruptDocument(
            "top-level value is not an object".to_owned(),
        ));
    }
    Ok(document)
}

/// Serialises a document the way it is written to disk.
#[must_use]
pub fn render_document(document: &Value) -> String {
    format!("{document:#}\n")
}

/// Applies an edit to the section at `path`.
///
/// Intermediate objects are created on demand. A section emptied by a
/// removal is dropped only under [`EmptiedSection::Drop`], so adding and then
/// removing a server restores the original document whether or not it
/// started with the section.
///
/// # Errors
///
/// Returns [`SyncDomainError::CorruptDocument`] when the document or a value
/// on the section path is not an object.
pub fn apply_edit(
    document: &mut Value,
    path: &SectionPath,
    edit: SectionEdit,
    emptied: EmptiedSection,
) -> Result<(), SyncDomainError> {
    let root = document.as_object_mut().ok_or_else(|| {
        SyncDomainError::CorruptDocument("top-level value is not an object".to_owned())
    })?;

    match edit {
        SectionEdit::Reconcile { desired, retired } => {
            let stale: Vec<String> = retired
                .into_iter()
                .filter(|key| !desired.iter().any(|(wanted, _)| wanted == key))
                .collect();
            if !desired.is_empty() {
                let section = ensure_section(root, path)?;
                for (key, entry) in desired {
                    section.insert(key, entry);
                }
            }
            remove_keys(root, path, &stale, emptied)
        }
        SectionEdit::Add { key, entry } => {
            let section = ensure_section(root, path)?;
            section.entry(key).or_insert(entry);
            Ok(())
        }
        SectionEdit::Remove { key } => remove_keys(root, path, &[key], emptied),
    }
}

fn not_an_object(path: &SectionPath, segment: &str) -> SyncDomainError {
    SyncDomainError::CorruptDocument(format!("`{segment}` on section path `{path}` is not an object"))
}

fn ensure_section<'a>(
    root: &'a mut Map<String, Value>,
    path: &SectionPath,
) -> Result<&'a mut Map<String, Value>, SyncDomainError> {
    let mut current = root;
    for segment in path.segments() {
        current = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| not_an_object(path, segment))?;
    }
    Ok(current)
}

fn existing_map<'a>(
    root: &'a mut Map<String, Value>,
    segments: &[String],
    path: &SectionPath,
) -> Result<Option<&'a mut Map<String, Value>>, SyncDomainError> {
    let mut current = root;
    for segment in segments {
        let Some(next) = current.get_mut(segment) else {
            return Ok(None);
        };
        current = next
            .as_object_mut()
            .ok_or_else(|| not_an_object(path, segment))?;
    }
    Ok(Some(current))
}

fn remove_keys(
    root: &mut Map<String, Value>,
    path: &SectionPath,
    keys: &[String],
    emptied: EmptiedSection,
) -> Result<(), SyncDomainError> {
    if keys.is_empty() {
        return Ok(());
    }
    let Some((leaf, parents)) = path.segments().split_last() else {
        return Ok(());
    };
    let Some(parent) = existing_map(root, parents, path)? else {
        return Ok(());
    };
    let Some(section_value) = parent.get_mut(leaf) else {
        return Ok(());
    };
    let section = section_value
        .as_object_mut()
        .ok_or_else(|| not_an_object(path, leaf))?;

    let mut removed = false;
    for key in keys {
        removed |= section.shift_remove(key).is_some();
    }
    if removed && section.is_empty() && emptied == EmptiedSection::Drop {
        parent.shift_remove(leaf);
    }
    Ok(())
}
