//! List the registered datasets

use super::Output;
use crate::error::CliResult;
use gtile_core::Engine;

pub async fn execute(engine: &Engine, output: Output) -> CliResult<()> {
    let datasets = engine.datasets().await;
    log::info!("{} datasets registered", datasets.len());
    output.print(&datasets)
}
