//! JSON-file backed session registry.
//!
//! Every operation reloads the whole document, applies its change and writes
//! the document back under one process-wide lock. Writes go to a temp file in
//! the same directory and are renamed over the store, so readers never see a
//! partial document. There is no cross-process locking.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::SessionError;

use super::{Session, Status, normalize_id};

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    sessions: Vec<Session>,
}

impl StoreFile {
    fn position(&self, id: &str) -> Option<usize> {
        let id = normalize_id(id);
        self.sessions.iter().position(|s| s.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Session, SessionError> {
        match self.position(id) {
            Some(idx) => Ok(&mut self.sessions[idx]),
            None => Err(SessionError::not_found(normalize_id(id))),
        }
    }
}

pub struct SessionStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl SessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a new session. Fails if the case-normalized id is taken.
    pub fn add(&self, session: Session) -> Result<(), SessionError> {
        let mut session = session;
        session.id = normalize_id(&session.id);
        session.validate()?;

        self.write(|file| {
            if file.position(&session.id).is_some() {
                return Err(SessionError::DuplicateId {
                    id: session.id.clone(),
                });
            }
            debug!(session = %session.id, status = %session.status, "store:add");
            file.sessions.push(session);
            Ok(())
        })
    }

    /// Case-insensitive lookup.
    pub fn get(&self, id: &str) -> Result<Session, SessionError> {
        self.read(|file| {
            file.position(id)
                .map(|idx| file.sessions[idx].clone())
                .ok_or_else(|| SessionError::not_found(normalize_id(id)))
        })
    }

    /// Move a session to `status`, enforcing the lifecycle graph.
    pub fn update_status(&self, id: &str, status: Status) -> Result<Session, SessionError> {
        self.write(|file| {
            let session = file.find_mut(id)?;
            session.transition(status)?;
            debug!(session = %session.id, %status, "store:update status");
            Ok(session.clone())
        })
    }

    /// Replace a stored session wholesale, keyed by its id.
    ///
    /// The creation time of the stored record is kept. Legacy records cannot be
    /// replaced and status changes must follow the lifecycle graph.
    pub fn update_session(&self, session: Session) -> Result<Session, SessionError> {
        let mut session = session;
        session.id = normalize_id(&session.id);

        self.write(|file| {
            let existing = file.find_mut(&session.id)?;
            if existing.is_legacy() || session.is_legacy() {
                return Err(SessionError::LegacySession {
                    id: existing.id.clone(),
                });
            }
            if existing.status != session.status
                && !existing.status.can_transition_to(session.status)
            {
                return Err(SessionError::InvalidTransition {
                    id: existing.id.clone(),
                    from: existing.status,
                    to: session.status,
                });
            }
            session.created_at = existing.created_at;
            session.validate()?;
            debug!(session = %session.id, status = %session.status, "store:update session");
            *existing = session;
            Ok(existing.clone())
        })
    }

    /// Delete a session, returning the removed record.
    pub fn remove(&self, id: &str) -> Result<Session, SessionError> {
        self.write(|file| {
            let idx = file
                .position(id)
                .ok_or_else(|| SessionError::not_found(normalize_id(id)))?;
            let removed = file.sessions.remove(idx);
            debug!(session = %removed.id, "store:remove");
            Ok(removed)
        })
    }

    pub fn list(&self) -> Result<Vec<Session>, SessionError> {
        self.read(|file| Ok(file.sessions.clone()))
    }

    /// Sessions that are Provisioning or Running.
    pub fn list_active(&self) -> Result<Vec<Session>, SessionError> {
        self.read(|file| {
            Ok(file
                .sessions
                .iter()
                .filter(|s| s.status.is_active())
                .cloned()
                .collect())
        })
    }

    /// Active sessions whose timeout has elapsed at `now` (seconds since epoch).
    pub fn list_expired(&self, now: u64) -> Result<Vec<Session>, SessionError> {
        self.read(|file| {
            Ok(file
                .sessions
                .iter()
                .filter(|s| s.status.is_active() && s.is_expired(now))
                .cloned()
                .collect())
        })
    }

    /// Every stored id, for collision-free name generation.
    pub fn used_names(&self) -> Result<HashSet<String>, SessionError> {
        self.read(|file| Ok(file.sessions.iter().map(|s| s.id.clone()).collect()))
    }

    fn read<T>(
        &self,
        op: impl FnOnce(&StoreFile) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        let file = self.load()?;
        op(&file)
    }

    fn write<T>(
        &self,
        op: impl FnOnce(&mut StoreFile) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;
        let out = op(&mut file)?;
        self.save(&file)?;
        Ok(out)
    }

    fn io_err(&self, source: std::io::Error) -> SessionError {
        SessionError::StoreIo {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<StoreFile, SessionError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "store:no file yet");
                return Ok(StoreFile::default());
            }
            Err(e) => return Err(self.io_err(e)),
        };
        if contents.trim().is_empty() {
            return Ok(StoreFile::default());
        }
        serde_json::from_str(&contents).map_err(|source| SessionError::StoreDecode {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, file: &StoreFile) -> Result<(), SessionError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_private_dir(&parent).map_err(|e| self.io_err(e))?;

        let json = serde_json::to_string_pretty(file).map_err(|source| {
            SessionError::StoreDecode {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| self.io_err(e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.io_err(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_err(e))?;
        }

        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        trace!(path = %self.path.display(), count = file.sessions.len(), "store:saved");
        Ok(())
    }
}

/// Create `dir` (and parents) with owner-only access if it does not exist.
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
