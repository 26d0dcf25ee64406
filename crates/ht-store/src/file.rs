use ht_types::{SearchSpace, SessionId, TuneResult, TuningSession};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::TuningStore;

/// One pretty-printed JSON document per record:
///
/// ```text
/// <root>/spaces/<space_id>.json
/// <root>/sessions/<session_id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> TuneResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("spaces"))?;
        std::fs::create_dir_all(root.join("sessions"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn space_path(&self, space_id: &str) -> PathBuf {
        self.root.join("spaces").join(file_name(space_id))
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.root.join("sessions").join(file_name(session_id))
    }

    fn write<T: Serialize>(&self, path: &Path, value: &T) -> TuneResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        // Rename over the old file so readers never see a partial document.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "record written");
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, path: &Path) -> TuneResult<Option<T>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Identifiers become file names; anything outside `[A-Za-z0-9_.-]` is
/// replaced so an id can never leave its directory.
fn file_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    format!("{}.json", safe.trim_start_matches('.'))
}

impl TuningStore for JsonFileStore {
    fn save_search_space(&self, space: &SearchSpace) -> TuneResult<()> {
        self.write(&self.space_path(&space.id), space)
    }

    fn load_search_space(&self, space_id: &str) -> TuneResult<Option<SearchSpace>> {
        self.read(&self.space_path(space_id))
    }

    fn save_session(&self, session: &TuningSession) -> TuneResult<()> {
        self.write(&self.session_path(&session.id), session)
    }

    fn load_session(&self, session_id: &str) -> TuneResult<Option<TuningSession>> {
        self.read(&self.session_path(session_id))
    }

    fn session_ids(&self) -> TuneResult<Vec<SessionId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(self.root.join("sessions"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(session) = self.read::<TuningSession>(&path)? {
                ids.push(session.id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
