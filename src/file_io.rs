use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Where an export goes: `output` itself, `default_name` inside it when it
/// is a directory, or `default_name` in the working directory when absent.
pub fn export_path(output: Option<&Path>, default_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(default_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(default_name),
    }
}

/// Save an exchange document or a generated archive
pub fn save_document(contents: impl AsRef<[u8]>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to save to {:?}", path))?;
    Ok(())
}

/// Load an exchange document
pub fn load_document(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read from {:?}", path))?;
    if content.trim().is_empty() {
        bail!("{:?} is empty", path);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saves_into_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("model.xmi");

        save_document("<uml:Model/>", &path).unwrap();
        assert_eq!(load_document(&path).unwrap(), "<uml:Model/>");
    }

    #[test]
    fn archives_are_written_byte_for_byte() {
        let dir = tempdir().unwrap();
        let path = export_path(Some(dir.path()), "generated_classes.zip");
        let archive = [0x50, 0x4b, 0x05, 0x06, 0x00, 0xff];

        save_document(archive, &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), archive);
    }

    #[test]
    fn directory_output_gets_the_default_name() {
        let dir = tempdir().unwrap();
        assert_eq!(export_path(Some(dir.path()), "uml_diagram.xml"), dir.path().join("uml_diagram.xml"));
        assert_eq!(export_path(None, "uml_diagram.xml"), PathBuf::from("uml_diagram.xml"));

        let file = dir.path().join("mine.xml");
        assert_eq!(export_path(Some(&file), "uml_diagram.xml"), file);
    }

    #[test]
    fn empty_and_missing_files_are_errors() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.xml");
        fs::write(&empty, "  \n").unwrap();

        assert!(load_document(&empty).unwrap_err().to_string().contains("empty"));
        let missing = load_document(&dir.path().join("nope.xml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read"));
    }
}
