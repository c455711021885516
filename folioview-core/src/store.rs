use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::highlight::HighlightRecord;
use crate::page::PageNumber;
use crate::transform::Rotation;
use crate::viewport::ViewportState;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f1d7c52-8a0e-5b6e-9c41-2d6a0f9be71a").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewPreferences {
    pub zoom: f64,
    pub rotation: Rotation,
    pub sidebar_width: f64,
}

impl Default for ViewPreferences {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            rotation: Rotation::Deg0,
            sidebar_width: 320.0,
        }
    }
}

impl ViewPreferences {
    pub fn apply_to(&self, viewport: &mut ViewportState) {
        viewport.set_zoom(self.zoom);
        viewport.set_rotation(self.rotation);
    }

    pub fn capture(viewport: &ViewportState, sidebar_width: f64) -> Self {
        Self {
            zoom: viewport.zoom(),
            rotation: viewport.rotation(),
            sidebar_width,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedDocumentState {
    pub current_page: Option<PageNumber>,
    pub preferences: ViewPreferences,
    pub highlights: Vec<HighlightRecord>,
}

pub trait StateStore: Send + Sync {
    fn load(&self, id: DocumentId) -> Result<Option<PersistedDocumentState>>;
    fn save(&self, id: DocumentId, state: &PersistedDocumentState) -> Result<()>;
}

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn state_path(&self, id: DocumentId) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, id: DocumentId) -> Result<Option<PersistedDocumentState>> {
        let path = self.state_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open state file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let state = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, id: DocumentId, state: &PersistedDocumentState) -> Result<()> {
        let path = self.state_path(id);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, PersistedDocumentState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, id: DocumentId) -> Result<Option<PersistedDocumentState>> {
        Ok(self.inner.lock().get(&id).cloned())
    }

    fn save(&self, id: DocumentId, state: &PersistedDocumentState) -> Result<()> {
        self.inner.lock().insert(id, state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::highlight::HighlightColor;
    use tempfile::tempdir;

    #[test]
    fn document_id_is_stable_for_same_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        fs::write(&file_path, b"dummy").unwrap();
        assert_eq!(
            document_id_for_path(&file_path),
            document_id_for_path(&file_path)
        );
        assert_ne!(
            document_id_for_path(&file_path),
            document_id_for_path(&dir.path().join("other.pdf"))
        );
    }

    #[test]
    fn file_store_round_trips_highlights_and_preferences() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state")).unwrap();
        let id = document_id_for_path(&dir.path().join("book.pdf"));

        let record = HighlightRecord::new(
            PageNumber::new(4).unwrap(),
            HighlightColor::Green,
            "a sentence",
            vec![Rect::new(10.5, 20.25, 100.0, 12.0)],
        );
        let state = PersistedDocumentState {
            current_page: PageNumber::new(4),
            preferences: ViewPreferences {
                zoom: 1.75,
                rotation: Rotation::Deg90,
                sidebar_width: 280.0,
            },
            highlights: vec![record],
        };
        store.save(id, &state).unwrap();

        let restored = store.load(id).unwrap().unwrap();
        assert_eq!(restored, state);
        assert!(store.load(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn corrupt_state_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();
        fs::write(dir.path().join(format!("{id}.json")), "{not json").unwrap();
        assert!(store.load(id).is_err());
    }

    #[test]
    fn preferences_restore_onto_viewport() {
        let mut viewport = ViewportState::default();
        let prefs = ViewPreferences {
            zoom: 9.0,
            rotation: Rotation::Deg180,
            sidebar_width: 300.0,
        };
        prefs.apply_to(&mut viewport);
        assert_eq!(viewport.zoom(), 3.0);
        assert_eq!(viewport.rotation(), Rotation::Deg180);
        assert_eq!(ViewPreferences::capture(&viewport, 300.0).zoom, 3.0);
    }
}
