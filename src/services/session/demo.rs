//! Bundled demo dataset.

use anyhow::{Result, anyhow};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

const DEMO_SCRIPT: &str = "demo.sql";

/// SQL script that creates and fills the Customers, Products and Orders
/// tables.
pub fn demo_script() -> Result<String> {
    let file = Assets::get(DEMO_SCRIPT).ok_or_else(|| anyhow!("Missing asset {}", DEMO_SCRIPT))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}
