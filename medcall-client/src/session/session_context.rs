use medcall_core::Participant;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

/// Who is using this client. Passed explicitly to whatever needs the
/// identity instead of living in global state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    participant: Option<Participant>,
    credential_path: Option<PathBuf>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the identity saved at `path`. A missing or unreadable file
    /// leaves the context unauthenticated.
    pub fn initialize_from_persisted(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let participant = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Participant>(&text) {
                Ok(participant) => {
                    info!("Restored session for {}", participant);
                    Some(participant)
                }
                Err(e) => {
                    warn!("Discarding corrupt credential {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cannot read credential {}: {}", path.display(), e);
                None
            }
        };

        Self {
            participant,
            credential_path: Some(path),
        }
    }

    /// Sets the identity and persists it when the context has a path.
    pub fn authenticate(&mut self, participant: Participant) -> io::Result<()> {
        if let Some(path) = &self.credential_path {
            let json = serde_json::to_string(&participant)?;
            std::fs::write(path, json)?;
        }
        self.participant = Some(participant);
        Ok(())
    }

    /// Forgets the identity and deletes any persisted copy.
    pub fn invalidate(&mut self) {
        self.participant = None;
        if let Some(path) = &self.credential_path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cannot remove credential {}: {}", path.display(), e),
            }
        }
    }

    pub fn participant(&self) -> Option<&Participant> {
        self.participant.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.participant.is_some()
    }
}
