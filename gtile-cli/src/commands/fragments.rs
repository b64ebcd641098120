//! Extract fragments for a file of loci

use super::Output;
use crate::error::{CliError, CliResult};
use gtile_core::{Engine, FragmentOptions, FragmentResult};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Read a loci body from a file, or from standard input for `-`
pub fn read_loci(path: &Path) -> CliResult<Value> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        if !path.exists() {
            return Err(CliError::file_not_found(path.to_path_buf()));
        }
        std::fs::read_to_string(path)?
    };
    serde_json::from_str(&content).map_err(|e| CliError::input(path.display().to_string(), e.to_string()))
}

pub async fn execute(engine: &Engine, output: Output, loci: &Path, options: &FragmentOptions) -> CliResult<()> {
    let body = read_loci(loci)?;
    log::info!(
        "Extracting fragments from {} (dims {}, percentile {})",
        loci.display(),
        options.dims,
        options.percentile
    );

    let response = engine.fragments(&body, options).await?;
    for (i, fragment) in response.fragments.iter().enumerate() {
        if let FragmentResult::Error { error } = fragment {
            log::warn!("Locus {} failed: {}", i, error);
        }
    }
    output.print(&response)
}
