// LogWarden - app/phase_mgr.rs
//
// Manages loading of phase tables from both built-in sources (embedded in
// the binary) and user-defined TOML files on disk.
// User tables override built-in tables with the same ID.

use crate::core::model::PhaseTable;
use crate::core::phase;
use crate::util::constants;
use crate::util::error::PhaseTableError;
use std::path::Path;

/// Load all available tables: built-in first, then user-defined overrides.
///
/// User tables with the same ID as a built-in table replace the built-in.
/// Invalid tables are logged and skipped (non-fatal).
///
/// Returns the merged list and any non-fatal errors encountered.
pub fn load_all_tables(user_table_dir: Option<&Path>) -> (Vec<PhaseTable>, Vec<PhaseTableError>) {
    let mut tables = phase::load_builtin_tables();
    let mut errors = Vec::new();

    tracing::info!(builtin_count = tables.len(), "Loaded built-in phase tables");

    if let Some(dir) = user_table_dir {
        if dir.is_dir() {
            let (user_tables, user_errors) = load_user_tables(dir);
            errors.extend(user_errors);

            for user_table in user_tables {
                if let Some(pos) = tables.iter().position(|t| t.id == user_table.id) {
                    tracing::info!(
                        table_id = %user_table.id,
                        version = %user_table.version,
                        "User phase table overrides built-in"
                    );
                    tables[pos] = user_table;
                } else {
                    tracing::info!(table_id = %user_table.id, "Loaded user-defined phase table");
                    tables.push(user_table);
                }
            }
        } else {
            tracing::debug!(
                dir = %dir.display(),
                "User phase-table directory does not exist (skipping)"
            );
        }
    }

    if tables.len() > constants::MAX_PHASE_TABLES {
        tracing::warn!(
            count = tables.len(),
            max = constants::MAX_PHASE_TABLES,
            "Too many phase tables loaded, truncating"
        );
        errors.push(PhaseTableError::TooManyTables {
            count: tables.len(),
            max: constants::MAX_PHASE_TABLES,
        });
        tables.truncate(constants::MAX_PHASE_TABLES);
    }

    for e in &errors {
        tracing::warn!(error = %e, "Phase table skipped");
    }
    tracing::info!(total = tables.len(), "Phase table loading complete");

    (tables, errors)
}

/// Pick the table with the given id.
pub fn select_table(tables: Vec<PhaseTable>, id: &str) -> Result<PhaseTable, PhaseTableError> {
    tables
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| PhaseTableError::UnknownTable { id: id.to_string() })
}

/// Load user-defined tables from a directory, in file-name order.
fn load_user_tables(dir: &Path) -> (Vec<PhaseTable>, Vec<PhaseTableError>) {
    let mut tables = Vec::new();
    let mut errors = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(PhaseTableError::Io {
                path: dir.to_path_buf(),
                source: e,
            });
            return (tables, errors);
        }
    };

    let mut paths = Vec::new();
    for entry_result in entries {
        match entry_result {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => errors.push(PhaseTableError::Io {
                path: dir.to_path_buf(),
                source: e,
            }),
        }
    }
    paths.sort();

    for path in paths {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                errors.push(PhaseTableError::Io {
                    path: path.clone(),
                    source: e,
                });
                continue;
            }
        };

        if metadata.len() > constants::MAX_PHASE_TABLE_FILE_SIZE {
            errors.push(PhaseTableError::FileTooLarge {
                path: path.clone(),
                size: metadata.len(),
                max_size: constants::MAX_PHASE_TABLE_FILE_SIZE,
            });
            continue;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                errors.push(PhaseTableError::Io {
                    path: path.clone(),
                    source: e,
                });
                continue;
            }
        };

        match phase::parse_table_toml(&content, &path)
            .and_then(|def| phase::validate_and_compile(def, false))
        {
            Ok(t) => tables.push(t),
            Err(e) => errors.push(e),
        }
    }

    (tables, errors)
}
