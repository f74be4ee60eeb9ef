//! In-memory session and video storage for the mock backend
//! Nothing is persisted; restarting the server forgets every session
use chrono::Utc;
use media_pipeline::SessionStatus;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Uploaded,
    Processing,
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uploaded => "uploaded",
            SessionState::Processing => "processing",
            SessionState::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub timestamp: f64,
    pub original_filename: String,
    pub audio_bytes: usize,
    pub state: SessionState,
    pub video_name: Option<String>,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            status: self.state.as_str().to_string(),
            timestamp: self.timestamp,
            filename: self.original_filename.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginError {
    UnknownSession,
    AlreadyProcessed,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    videos: RwLock<HashMap<String, Vec<u8>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload, returning the new session id
    pub fn create_session(&self, original_filename: &str, audio_bytes: usize) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            original_filename: original_filename.to_string(),
            audio_bytes,
            state: SessionState::Uploaded,
            video_name: None,
        };
        self.sessions.write().insert(id.clone(), session);
        id
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Move an uploaded session to processing under one write lock.
    /// Each session can only be claimed once.
    pub fn begin_processing(&self, id: &str) -> Result<Session, BeginError> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(id).ok_or(BeginError::UnknownSession)?;
        if session.state != SessionState::Uploaded {
            return Err(BeginError::AlreadyProcessed);
        }
        session.state = SessionState::Processing;
        Ok(session.clone())
    }

    /// Store a rendered video for a session and mark it completed
    pub fn complete(&self, id: &str, video_name: &str, data: Vec<u8>) {
        self.videos.write().insert(video_name.to_string(), data);
        if let Some(session) = self.sessions.write().get_mut(id) {
            session.state = SessionState::Completed;
            session.video_name = Some(video_name.to_string());
        }
    }

    pub fn get_video(&self, name: &str) -> Option<Vec<u8>> {
        self.videos.read().get(name).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let store = SessionStore::new();
        let id = store.create_session("song.mp3", 1024);
        assert_eq!(store.get_session(&id).unwrap().state, SessionState::Uploaded);

        let claimed = store.begin_processing(&id).unwrap();
        assert_eq!(claimed.state, SessionState::Processing);
        assert_eq!(store.get_session(&id).unwrap().status().status, "processing");
        assert_eq!(store.begin_processing(&id).unwrap_err(), BeginError::AlreadyProcessed);

        store.complete(&id, "video_1.mp4", b"frames".to_vec());
        let session = store.get_session(&id).unwrap();
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.video_name.as_deref(), Some("video_1.mp4"));
        assert_eq!(store.get_video("video_1.mp4").unwrap(), b"frames");
        assert!(store.get_session("missing").is_none());
        assert_eq!(store.begin_processing("missing").unwrap_err(), BeginError::UnknownSession);
    }

    #[test]
    fn test_concurrent_claims_admit_one() {
        let store = std::sync::Arc::new(SessionStore::new());
        let id = store.create_session("song.wav", 2048);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                std::thread::spawn(move || store.begin_processing(&id).is_ok())
            })
            .collect();
        let claimed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(claimed, 1);
    }
}
