//! Object type catalogue and deletion input files.

use crate::api::CrmClient;
use crate::error::{EngineError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Identifier column in every input and record output file
pub const RECORD_ID_COLUMN: &str = "Record ID";

/// Standard object types with the names users give their files
const STANDARD_OBJECTS: &[(&str, &[&str])] = &[
    ("contacts", &["contact", "contacts"]),
    ("companies", &["company", "companies"]),
    ("deals", &["deal", "deals"]),
    ("tickets", &["ticket", "tickets"]),
    ("products", &["product", "products"]),
    (
        "line_items",
        &["line_item", "line_items", "lineitem", "lineitems"],
    ),
    ("quotes", &["quote", "quotes"]),
    ("calls", &["call", "calls"]),
    ("emails", &["email", "emails"]),
    ("meetings", &["meeting", "meetings"]),
    ("notes", &["note", "notes"]),
    ("tasks", &["task", "tasks"]),
];

/// Names of the built-in object types
#[must_use]
pub fn standard_objects() -> Vec<&'static str> {
    STANDARD_OBJECTS.iter().map(|(name, _)| *name).collect()
}

/// Maps a singular or plural spelling to its canonical standard name.
///
/// Matching ignores case and treats spaces and dashes as underscores.
#[must_use]
pub fn canonical_object_name(name: &str) -> Option<&'static str> {
    let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
    STANDARD_OBJECTS
        .iter()
        .find(|(_, synonyms)| synonyms.contains(&normalized.as_str()))
        .map(|(name, _)| *name)
}

/// Object type named by an input file: `Companies.csv` is `companies`.
/// Names outside the synonym table are returned as they are.
#[must_use]
pub fn object_type_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    canonical_object_name(&stem).map_or(stem, str::to_string)
}

/// Object types the portal knows: the standard set plus its custom schemas
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectCatalog {
    pub standard: Vec<String>,
    pub custom: Vec<String>,
}

impl ObjectCatalog {
    /// Catalogue with custom schema names appended to the standard set
    #[must_use]
    pub fn with_custom(custom: Vec<String>) -> Self {
        Self {
            standard: standard_objects().into_iter().map(str::to_string).collect(),
            custom,
        }
    }

    /// Every name, standard types first
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.standard
            .iter()
            .chain(self.custom.iter())
            .map(String::as_str)
    }

    /// Case-insensitive, like [`Self::resolve`]
    #[must_use]
    pub fn contains(&self, object: &str) -> bool {
        self.all().any(|o| o.eq_ignore_ascii_case(object))
    }

    /// Resolves user input to a known object type
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownObjectType`] when nothing matches.
    pub fn resolve(&self, input: &str) -> Result<String> {
        if let Some(name) = canonical_object_name(input) {
            return Ok(name.to_string());
        }
        let trimmed = input.trim();
        self.custom
            .iter()
            .find(|c| c.eq_ignore_ascii_case(trimmed))
            .cloned()
            .ok_or_else(|| EngineError::UnknownObjectType(trimmed.to_string()))
    }

    /// Fetches custom schema names and builds the catalogue
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SchemaLookup`] if the schema list cannot be read.
    pub async fn load(client: &CrmClient) -> Result<Self> {
        let schemas = client
            .list_schemas()
            .await
            .map_err(|source| EngineError::SchemaLookup {
                object: "custom objects".to_string(),
                source,
            })?;
        let custom: Vec<String> = schemas.into_iter().map(|s| s.name).collect();
        debug!(custom = custom.len(), "Loaded object catalogue");
        Ok(Self::with_custom(custom))
    }
}

/// Reads identifiers from the `Record ID` column, in file order.
///
/// The header match ignores case and surrounding whitespace. Blank cells are
/// skipped; duplicates are kept.
///
/// # Errors
///
/// - [`EngineError::InputFormat`] if the column is missing
/// - [`EngineError::Csv`] if the file cannot be read
pub fn read_record_ids(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let column = reader
        .headers()?
        .iter()
        .position(|h| {
            h.trim_start_matches('\u{feff}')
                .trim()
                .eq_ignore_ascii_case(RECORD_ID_COLUMN)
        })
        .ok_or_else(|| EngineError::InputFormat {
            path: path.to_path_buf(),
            reason: format!("no '{RECORD_ID_COLUMN}' column"),
        })?;

    let mut ids = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(id) = row.get(column).map(str::trim).filter(|id| !id.is_empty()) {
            ids.push(id.to_string());
        }
    }
    info!(path = %path.display(), ids = ids.len(), "Read record ids");
    Ok(ids)
}

/// CSV files directly inside `dir`, sorted by name
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn find_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}
