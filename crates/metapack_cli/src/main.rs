//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `metapack_core` linkage and that a fresh store migrates.

use metapack_core::{core_version, schema_version, MetadataManager};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("metapack_core version={}", core_version());
    match MetadataManager::open_in_memory().and_then(|manager| manager.documents()) {
        Ok(documents) => {
            println!(
                "metapack_core schema_version={} documents={}",
                schema_version(),
                documents.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("event=cli_probe module=cli status=error error={err}");
            eprintln!("metapack_core store bootstrap failed: {err}");
            ExitCode::FAILURE
        }
    }
}
