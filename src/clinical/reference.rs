use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rusqlite::Connection;

use crate::db::{repository, DatabaseError};
use crate::models::enums::TestKind;
use crate::models::LabTestDefinition;

use super::ClinicalError;

const BUNDLED_CATALOG: &str = include_str!("../../resources/lab_catalog.json");

/// One catalog entry as shipped in `lab_catalog.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub test_name: String,
    pub description: Option<String>,
    pub unit: String,
    pub normal_min: f64,
    pub normal_max: f64,
    pub category: Option<String>,
    /// Explicit tag; inferred from the name when absent.
    #[serde(default)]
    pub kind: Option<TestKind>,
}

impl CatalogEntry {
    pub fn resolved_kind(&self) -> TestKind {
        self.kind
            .unwrap_or_else(|| TestKind::infer_from_name(&self.test_name))
    }

    fn to_definition(&self) -> LabTestDefinition {
        LabTestDefinition {
            id: Uuid::new_v4(),
            test_name: self.test_name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            normal_min: self.normal_min,
            normal_max: self.normal_max,
            category: self.category.clone(),
            kind: self.resolved_kind(),
        }
    }
}

/// Seed catalog of lab test definitions.
#[derive(Debug, Clone)]
pub struct LabCatalog {
    pub entries: Vec<CatalogEntry>,
}

impl LabCatalog {
    /// Catalog compiled into the binary.
    pub fn bundled() -> Result<Self, ClinicalError> {
        Self::parse("lab_catalog.json", BUNDLED_CATALOG)
    }

    /// Load a catalog override from disk.
    pub fn load(path: &std::path::Path) -> Result<Self, ClinicalError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ClinicalError::ReferenceDataLoad(path.display().to_string(), e.to_string())
        })?;
        Self::parse(&path.display().to_string(), &json)
    }

    fn parse(source: &str, json: &str) -> Result<Self, ClinicalError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)
            .map_err(|e| ClinicalError::ReferenceDataParse(source.into(), e.to_string()))?;

        for entry in &entries {
            if !(entry.normal_min <= entry.normal_max) {
                return Err(ClinicalError::ReferenceDataParse(
                    source.into(),
                    format!("{}: normal_min exceeds normal_max", entry.test_name),
                ));
            }
        }

        Ok(Self { entries })
    }

    pub fn find(&self, test_name: &str) -> Option<&CatalogEntry> {
        let lower = test_name.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.test_name.to_lowercase() == lower)
    }
}

/// Idempotent catalog seeding: inserts the catalog only when no lab test
/// exists yet. Safe to call on every startup. Returns the number inserted.
pub fn bootstrap_catalog(conn: &Connection, catalog: &LabCatalog) -> Result<usize, DatabaseError> {
    let existing = repository::count_lab_tests(conn)?;
    if existing > 0 {
        tracing::info!(existing, "Lab tests already exist, skipping catalog seeding");
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    for entry in &catalog.entries {
        repository::insert_lab_test(&tx, &entry.to_definition())?;
    }
    tx.commit()?;

    tracing::info!(inserted = catalog.entries.len(), "Seeded lab test catalog");
    Ok(catalog.entries.len())
}
