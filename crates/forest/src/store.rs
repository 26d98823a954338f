use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::entity::PageRoot;
use crate::error::ForestError;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ForestDocRef<'a> {
    format: u32,
    filename: &'a str,
    pages: &'a [PageRoot],
}

#[derive(Deserialize)]
struct ForestDoc {
    format: u32,
    #[allow(dead_code)]
    filename: String,
    pages: Vec<PageRoot>,
}

#[derive(Debug)]
pub enum LoadedForest {
    Missing,
    Corrupt(String),
    Found(Vec<PageRoot>),
}

/// The on-disk entity cache of one paper.
#[derive(Debug, Clone)]
pub struct ForestStore {
    path: PathBuf,
}

impl ForestStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored forest, checking it against the paper's page count.
    pub fn load(&self, expected_pages: usize) -> LoadedForest {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return LoadedForest::Missing,
            Err(e) => return LoadedForest::Corrupt(format!("unreadable: {}", e)),
        };

        let doc: ForestDoc = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => return LoadedForest::Corrupt(format!("undecodable: {}", e)),
        };

        if doc.format != FORMAT_VERSION {
            return LoadedForest::Corrupt(format!("unknown format version {}", doc.format));
        }
        if doc.pages.len() != expected_pages {
            return LoadedForest::Corrupt(format!(
                "holds {} pages, paper has {}",
                doc.pages.len(),
                expected_pages
            ));
        }
        if let Some((i, root)) = doc.pages.iter().enumerate().find(|(i, r)| r.page != *i) {
            return LoadedForest::Corrupt(format!("page root {} is labelled page {}", i, root.page));
        }

        LoadedForest::Found(doc.pages)
    }

    /// Replace the stored forest atomically.
    ///
    /// The document goes to a temporary file beside the target, is synced,
    /// then renamed over it; a crash leaves either the old or the new file.
    pub fn save(&self, filename: &str, pages: &[PageRoot]) -> Result<(), ForestError> {
        let persist_err = |source| ForestError::Persist {
            path: self.path.clone(),
            source,
        };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(persist_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let doc = ForestDocRef {
                format: FORMAT_VERSION,
                filename,
                pages,
            };
            serde_json::to_writer_pretty(&mut writer, &doc)?;
            writer.flush().map_err(persist_err)?;
        }
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&self.path).map_err(|e| persist_err(e.error))?;

        tracing::debug!(path = %self.path.display(), pages = pages.len(), "Entity cache written");
        Ok(())
    }

    /// Move an unusable cache file aside so it is not lost when overwritten.
    pub fn quarantine(&self) -> std::io::Result<PathBuf> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".corrupt");
        let target = self.path.with_file_name(name);

        fs::rename(&self.path, &target)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{spawn_children, Entity};
    use extract::{EntityRef, Extraction};

    fn extraction(names: &[&str]) -> Extraction {
        let mut extraction = Extraction::default();
        for name in names {
            extraction.entities.insert(
                name.to_string(),
                EntityRef {
                    url: format!("https://dbpedia.org/{}", name),
                    summary: format!("{} is a concept.", name),
                },
            );
        }
        extraction
    }

    fn sample_forest() -> Vec<PageRoot> {
        let mut first = PageRoot::from_extraction(0, extraction(&["Qubit", "Spin"]));
        let qubit: &mut Entity = &mut first.children[0];
        let (children, _) = spawn_children(extraction(&["Bloch sphere"]), &qubit.found, 2);
        qubit.children = Some(children);
        first.children[1].children = Some(Vec::new());

        let second = PageRoot::from_extraction(1, extraction(&["Photon"]));
        let third = PageRoot::from_extraction(2, Extraction::default());
        vec![first, second, third]
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ForestStore::new(dir.path().join("entities").join("paper.entities.json"));
        let forest = sample_forest();

        store.save("paper.pdf", &forest).unwrap();

        match store.load(3) {
            LoadedForest::Found(pages) => assert_eq!(pages, forest),
            other => panic!("expected forest, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ForestStore::new(dir.path().join("none.entities.json"));

        assert!(matches!(store.load(1), LoadedForest::Missing));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.entities.json");
        fs::write(&path, b"\x80\x03pickle").unwrap();
        let store = ForestStore::new(path);

        assert!(matches!(store.load(1), LoadedForest::Corrupt(_)));
    }

    #[test]
    fn test_page_count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ForestStore::new(dir.path().join("paper.entities.json"));
        store.save("paper.pdf", &sample_forest()).unwrap();

        match store.load(5) {
            LoadedForest::Corrupt(reason) => assert!(reason.contains("3 pages")),
            other => panic!("expected corrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ForestStore::new(dir.path().join("paper.entities.json"));

        store.save("paper.pdf", &sample_forest()).unwrap();
        store.save("paper.pdf", &sample_forest()[..1]).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(matches!(store.load(1), LoadedForest::Found(pages) if pages.len() == 1));
    }

    #[test]
    fn test_quarantine_moves_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.entities.json");
        fs::write(&path, b"{").unwrap();
        let store = ForestStore::new(path.clone());

        let moved = store.quarantine().unwrap();

        assert!(!path.exists());
        assert_eq!(moved, dir.path().join("paper.entities.json.corrupt"));
        assert_eq!(fs::read(moved).unwrap(), b"{");
    }

    #[test]
    fn test_serialized_shape() {
        let forest = sample_forest();
        let json = serde_json::to_value(ForestDocRef {
            format: FORMAT_VERSION,
            filename: "paper.pdf",
            pages: &forest,
        })
        .unwrap();

        let qubit = &json["pages"][0]["children"][0];
        assert_eq!(qubit["name"], "Qubit");
        assert_eq!(qubit["abstract"], "Qubit is a concept.");
        assert_eq!(qubit["depth"], 1);
        assert_eq!(qubit["children"][0]["name"], "Bloch sphere");
        assert!(qubit["children"][0]["children"].is_null());
        assert_eq!(json["pages"][0]["children"][1]["children"], serde_json::json!([]));
    }
}
