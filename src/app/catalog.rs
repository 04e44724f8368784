// LogWarden - app/catalog.rs
//
// Product resolvers. `CatalogResolver` answers from a JSON export of the
// compatibility database (the same shape its HTTP API returns);
// `UnknownResolver` is used when no catalog is configured.

use crate::core::model::{ProductDescriptor, ProductResolver, ProductStatus};
use crate::util::constants;
use crate::util::error::CatalogError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Resolver with no data: every serial is unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownResolver;

impl ProductResolver for UnknownResolver {
    fn resolve(&self, serial: &str) -> ProductDescriptor {
        ProductDescriptor::unresolved(serial)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    results: HashMap<String, CatalogEntry>,
}

/// One record as exported. Numeric ids may arrive as numbers or strings.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    title: Option<String>,
    status: Option<String>,
    date: Option<String>,
    #[serde(default)]
    thread: Option<serde_json::Value>,
    commit: Option<String>,
    #[serde(default)]
    pr: Option<serde_json::Value>,
}

/// In-memory compatibility catalog keyed by upper-case serial.
#[derive(Debug, Clone, Default)]
pub struct CatalogResolver {
    products: HashMap<String, ProductDescriptor>,
}

impl CatalogResolver {
    /// Load a catalog export from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let metadata = std::fs::metadata(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.len() > constants::MAX_CATALOG_FILE_SIZE {
            return Err(CatalogError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                max_size: constants::MAX_CATALOG_FILE_SIZE,
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let resolver = Self::from_json(&content, path)?;
        tracing::info!(
            path = %path.display(),
            products = resolver.len(),
            "Loaded compatibility catalog"
        );
        Ok(resolver)
    }

    /// Parse a catalog export. `source_path` is used for error messages only.
    pub fn from_json(content: &str, source_path: &Path) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(content).map_err(|source| CatalogError::JsonParse {
                path: source_path.to_path_buf(),
                source,
            })?;

        let products = file
            .results
            .into_iter()
            .map(|(serial, entry)| {
                let serial = serial.trim().to_ascii_uppercase();
                let product = entry.into_descriptor(&serial);
                (serial, product)
            })
            .collect();
        Ok(Self { products })
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl ProductResolver for CatalogResolver {
    fn resolve(&self, serial: &str) -> ProductDescriptor {
        match self.products.get(&serial.to_ascii_uppercase()) {
            Some(product) => product.clone(),
            None => {
                tracing::debug!(serial, "Serial not in catalog");
                ProductDescriptor::unresolved(serial)
            }
        }
    }
}

impl CatalogEntry {
    fn into_descriptor(self, serial: &str) -> ProductDescriptor {
        let updated = self.date.as_deref().and_then(|d| {
            match NaiveDate::parse_from_str(d, constants::CATALOG_DATE_FORMAT) {
                Ok(date) => Some(date),
                Err(e) => {
                    tracing::debug!(serial, date = d, error = %e, "Unparseable catalog date");
                    None
                }
            }
        });

        ProductDescriptor {
            serial: Some(serial.to_string()),
            title: self.title,
            status: self
                .status
                .as_deref()
                .map(ProductStatus::from_label)
                .unwrap_or_default(),
            thread: self.thread.as_ref().and_then(id_value),
            // 0 means "no pull request" in the export.
            pull_request: self.pr.as_ref().and_then(id_value).filter(|pr| *pr != 0),
            commit: self.commit.filter(|c| !c.is_empty()),
            updated,
        }
    }
}

fn id_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
