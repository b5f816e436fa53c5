use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const LINKS_PATH: &str = "data/links.json";
pub const RECORDS_PATH: &str = "data/records.json";

/// Persist a stage's output so the next stage can run as a separate command.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Malformed JSON in {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductLink, ProductRecord};

    #[test]
    fn links_are_plain_strings() {
        let links = vec![ProductLink("https://shop.test/p/1/".into())];
        let json = serde_json::to_string(&links).unwrap();
        assert_eq!(json, r#"["https://shop.test/p/1/"]"#);
    }

    #[test]
    fn records_survive_a_file() {
        let path = std::env::temp_dir()
            .join(format!("dns_mice_handoff_{}", std::process::id()))
            .join("records.json");
        let records = vec![ProductRecord {
            name: "Мышь".into(),
            code: 42,
            price: 1299.0,
            country: "Китай".into(),
        }];
        write_json(&path, &records).unwrap();
        let back: Vec<ProductRecord> = read_json(&path).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn missing_file_names_path() {
        let err = read_json::<Vec<ProductLink>>(Path::new("/nonexistent/links.json")).unwrap_err();
        assert!(err.to_string().contains("links.json"));
    }
}
