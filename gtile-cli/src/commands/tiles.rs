//! Render a batch of tiles

use super::Output;
use crate::error::CliResult;
use gtile_core::Engine;

pub async fn execute(engine: &Engine, output: Output, ids: &[String]) -> CliResult<()> {
    let tiles = engine.tiles(ids).await;
    let omitted = ids.iter().filter(|id| !tiles.contains_key(id.as_str())).count();
    if omitted > 0 {
        log::info!("{} requested tiles lie outside their datasets and were omitted", omitted);
    }
    output.print(&tiles)
}
