//! Tileset info for dataset uids

use super::Output;
use crate::error::CliResult;
use gtile_core::{Engine, InfoResponse};

pub async fn execute(engine: &Engine, output: Output, uids: &[String]) -> CliResult<()> {
    let info = engine.tileset_info(uids).await;
    for (uid, response) in &info {
        if let InfoResponse::Error { error } = response {
            log::warn!("No tileset info for {}: {}", uid, error);
        }
    }
    output.print(&info)
}
