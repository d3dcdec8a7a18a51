//! Console summaries printed after each operation.

use crate::error::EngineError;
use crate::objects::ObjectCatalog;
use crate::operations::{BulkExport, DeletePlan, DeleteSummary, ExtractSummary};
use std::path::{Path, PathBuf};

pub fn objects(catalog: &ObjectCatalog) {
    println!("Standard objects:");
    for name in &catalog.standard {
        println!("  {name}");
    }
    if catalog.custom.is_empty() {
        println!("No custom objects.");
    } else {
        println!("Custom objects:");
        for name in &catalog.custom {
            println!("  {name}");
        }
    }
}

pub fn written(path: &Path) {
    println!("Wrote {}", path.display());
}

pub fn bulk(export: &BulkExport) {
    for path in &export.written {
        written(path);
    }
    for (object, error) in &export.failed {
        eprintln!("Skipped {object}: {error}");
    }
    println!(
        "{} file(s) written, {} object(s) skipped",
        export.written.len(),
        export.failed.len()
    );
}

pub fn extract(summary: &ExtractSummary) {
    for path in &summary.files {
        written(path);
    }
    println!(
        "Extracted {} {} record(s) into {} file(s)",
        summary.records,
        summary.object,
        summary.files.len()
    );
}

pub fn plan(plan: &DeletePlan) {
    println!(
        "{}: {} {} record(s) to archive",
        plan.path.display(),
        plan.ids.len(),
        plan.object
    );
}

pub fn rejected(rejected: &[(PathBuf, EngineError)]) {
    for (path, error) in rejected {
        eprintln!("Skipping {}: {error}", path.display());
    }
}

pub fn delete(summary: &DeleteSummary) {
    let result = &summary.result;
    println!(
        "{}: archived {}/{} record(s)",
        summary.object, result.success_count, result.total_count
    );
    if result.failed_count() > 0 {
        println!("{} record(s) in failed batches", result.failed_count());
    }
    if result.cancelled {
        println!("{} record(s) not attempted", result.skipped_count());
    }
    if let Some(ledger) = &summary.ledger {
        println!("Failed batches recorded in {}", ledger.display());
    }
}

/// Reports an operational failure; the tool keeps running
pub fn failure(error: &dyn std::fmt::Display) {
    eprintln!("Error: {error}");
}
