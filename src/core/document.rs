use super::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Key under which every history, catalog and customer item stores its
/// stable identifier.
pub const ID_KEY: &str = "id";

/// One identified item of a document list (history entry, color, material,
/// customer). The shape beyond `id` belongs to the application.
pub type Record = Map<String, Value>;

pub fn record_id(record: &Record) -> Option<&Value> {
    record.get(ID_KEY).filter(|id| !id.is_null())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Canonical Document
// ============================================================================

/// The authoritative on-disk business dataset.
///
/// Missing (or `null`) top-level keys deserialize as empty values, so a
/// loaded document always carries every expected key. Unknown top-level keys
/// are kept in `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entries: Vec<Record>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub colors: Vec<Record>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub materials: Vec<Record>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customers: Vec<Record>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub material_categories: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color_categories: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CanonicalDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a document as stored. Items without an `id` stay that way
    /// until `ensure_ids` runs, so parsing the same text twice yields the
    /// same document.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Gives every identified-item list entry without an `id` a fresh UUID.
    /// Returns how many identifiers were assigned.
    pub fn ensure_ids(&mut self) -> usize {
        let mut assigned = 0;
        for list in [
            &mut self.entries,
            &mut self.colors,
            &mut self.materials,
            &mut self.customers,
        ] {
            for record in list.iter_mut() {
                if record_id(record).is_none() {
                    record.insert(ID_KEY.to_string(), Value::String(Uuid::new_v4().to_string()));
                    assigned += 1;
                }
            }
        }
        assigned
    }
}

// ============================================================================
// Partial Document
// ============================================================================

/// A document in which every field is optional.
///
/// `None` means the field was absent; `Some(vec![])` means it was present and
/// empty. The merge rules for deletable category lists depend on that
/// difference, so absent fields are never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customers: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_categories: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PartialDocument {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_none()
            && self.entries.is_none()
            && self.colors.is_none()
            && self.materials.is_none()
            && self.customers.is_none()
            && self.material_categories.is_none()
            && self.color_categories.is_none()
            && self.extra.is_empty()
    }

    pub fn with_settings(mut self, settings: Map<String, Value>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_entries(mut self, entries: Vec<Record>) -> Self {
        self.entries = Some(entries);
        self
    }

    pub fn with_material_categories(mut self, categories: Vec<String>) -> Self {
        self.material_categories = Some(categories);
        self
    }

    pub fn with_color_categories(mut self, categories: Vec<String>) -> Self {
        self.color_categories = Some(categories);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_null_keys_default_to_empty() {
        let doc = CanonicalDocument::parse(r#"{"settings": null, "entries": []}"#).unwrap();
        assert!(doc.settings.is_empty());
        assert!(doc.colors.is_empty());
        assert!(doc.material_categories.is_empty());

        let written: Value = serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();
        for key in [
            "settings",
            "entries",
            "colors",
            "materials",
            "customers",
            "materialCategories",
            "colorCategories",
        ] {
            assert!(written.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn test_ensure_ids_assigns_missing_and_keeps_existing() {
        let text = r#"{"customers": [{"id": 7, "name": "Kim"}, {"name": "Lee"}]}"#;
        let mut doc = CanonicalDocument::parse(text).unwrap();
        assert_eq!(doc, CanonicalDocument::parse(text).unwrap());
        assert!(doc.customers[1].get("id").is_none());

        assert_eq!(doc.ensure_ids(), 1);
        assert_eq!(doc.customers[0].get("id"), Some(&json!(7)));
        assert!(doc.customers[1].get("id").and_then(Value::as_str).is_some());
        assert_eq!(doc.ensure_ids(), 0);
    }

    #[test]
    fn test_unknown_top_level_keys_survive() {
        let doc = CanonicalDocument::parse(r#"{"schemaVersion": 3}"#).unwrap();
        let text = doc.to_json_pretty().unwrap();
        assert!(text.contains("schemaVersion"));
    }

    #[test]
    fn test_partial_distinguishes_absent_from_empty() {
        let partial = PartialDocument::parse(r#"{"materialCategories": []}"#).unwrap();
        assert_eq!(partial.material_categories, Some(Vec::new()));
        assert_eq!(partial.color_categories, None);

        let text = serde_json::to_string(&partial).unwrap();
        assert_eq!(text, r#"{"materialCategories":[]}"#);
    }
}
