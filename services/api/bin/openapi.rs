//! Writes the service's OpenAPI document, by default to `openapi.json`.
//!
//! Usage: `openapi [OUTPUT_PATH]`

use std::path::PathBuf;
use studyguide_api::router::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("openapi.json"));

    let spec_json = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(&output, spec_json)?;
    println!("Wrote OpenAPI document to {}", output.display());
    Ok(())
}
