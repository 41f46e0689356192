pub mod parse;
pub mod run;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Read a transcript from a file, or from stdin when the path is `-`.
pub fn read_transcript(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read transcript from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read transcript {}", path.display()))
}
