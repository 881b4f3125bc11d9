pub mod output;

pub use output::{create_writer, AnalysisReport, OutputFormat, OutputWriter};

use crate::bytecode::ClassListing;
use crate::core::{Error, Result, ResultExt};
use std::fs;
use std::path::Path;

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::FileSystem {
        message: format!("cannot read {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })
}

pub fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| Error::FileSystem {
        message: format!("cannot write {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })
}

pub fn file_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Reads one class listing from a JSON file.
pub fn read_listing(path: &Path) -> Result<ClassListing> {
    let content = read_file(path)?;
    let listing: ClassListing = serde_json::from_str(&content)
        .map_err(Error::from)
        .context(format!("Parsing {}", path.display()))?;
    log::debug!(
        "Read {} method(s) of {} from {}",
        listing.methods.len(),
        listing.class,
        path.display()
    );
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::TempDir;

    #[test]
    fn test_read_listing_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Widget.json");
        write_file(
            &path,
            indoc! {r#"
                {
                  "class": "com/acme/Widget",
                  "methods": []
                }
            "#},
        )
        .unwrap();

        let listing = read_listing(&path).unwrap();
        assert_eq!(listing.class, "com/acme/Widget");
        assert!(listing.methods.is_empty());
        assert!(file_exists(&path));
    }

    #[test]
    fn test_read_listing_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        write_file(&path, "{ \"class\": ").unwrap();

        let err = read_listing(&path).unwrap_err();
        assert!(err.to_string().starts_with("Parsing "));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::FileSystem { .. }));
    }
}
