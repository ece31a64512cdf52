use crate::cache::GalleryCache;
use chrono::{DateTime, Utc};
use rollcall_core::{
    AttendanceDesk, AttendanceOutcome, CheckInError, CheckInPolicy, CheckInRecord,
    DuplicateDetector, Embedding, FaceMatcher, FaceRecord, MatchConfig, MatchError,
    RecognitionUseCase,
};
use rollcall_store::{AttendanceStore, RecordFilter, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("matching error: {0}")]
    Match(#[from] MatchError),
    #[error("check-in error: {0}")]
    CheckIn(#[from] CheckInError),
    #[error("no enrolled face with student id {0}")]
    UnknownStudent(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of an enrollment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RegisterOutcome {
    Registered,
    /// The student id is already enrolled (under `name`).
    DuplicateStudentId { name: String },
    /// The face is already enrolled as another student.
    DuplicateFace { student_id: String, name: String },
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Register {
        face: FaceRecord,
        reply: oneshot::Sender<Result<RegisterOutcome, EngineError>>,
    },
    Update {
        student_id: String,
        embedding: Embedding,
        photo_path: Option<String>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Delete {
        student_id: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Recognize {
        probe: Embedding,
        at: DateTime<Utc>,
        reply: oneshot::Sender<Result<AttendanceOutcome, EngineError>>,
    },
    LoadGallery {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    Faces {
        reply: oneshot::Sender<Result<Vec<FaceRecord>, EngineError>>,
    },
    CheckIns {
        filter: RecordFilter,
        reply: oneshot::Sender<Result<Vec<CheckInRecord>, EngineError>>,
    },
}

/// Store, gallery cache and decision logic, driven from one thread.
///
/// Being the only writer serializes check-in decisions within this
/// process; the store's transaction covers other processes.
pub struct Engine {
    store: AttendanceStore,
    embedding_size: usize,
    cache: GalleryCache,
    duplicates: DuplicateDetector<MatchConfig>,
    desk: AttendanceDesk<MatchConfig>,
}

impl Engine {
    pub fn new(
        store: AttendanceStore,
        matcher: FaceMatcher,
        match_config: MatchConfig,
        check_in_policy: CheckInPolicy,
    ) -> Self {
        Self {
            store,
            embedding_size: matcher.embedding_size(),
            cache: GalleryCache::new(),
            duplicates: DuplicateDetector::new(matcher.clone(), match_config),
            desk: AttendanceDesk::new(RecognitionUseCase::new(matcher, match_config), check_in_policy),
        }
    }

    /// Nothing of the wrong size may reach the store: one bad gallery entry
    /// fails every later match.
    fn check_embedding(&self, embedding: &Embedding) -> Result<(), MatchError> {
        if embedding.len() != self.embedding_size {
            return Err(MatchError::ProbeDimension {
                expected: self.embedding_size,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Enroll a face unless its id or its embedding is already enrolled.
    pub fn register(&mut self, face: FaceRecord) -> Result<RegisterOutcome, EngineError> {
        self.check_embedding(&face.embedding)?;
        if let Some(existing) = self.store.get_face(&face.student_id)? {
            tracing::info!(student_id = %face.student_id, "register: student id already enrolled");
            return Ok(RegisterOutcome::DuplicateStudentId {
                name: existing.name,
            });
        }

        let gallery = self.cache.load(&self.store)?;
        if let Some(student_id) = self.duplicates.find_duplicate(&gallery, &face.embedding)? {
            let name = self
                .store
                .get_face(&student_id)?
                .map(|f| f.name)
                .unwrap_or_else(|| student_id.clone());
            tracing::info!(
                student_id = %face.student_id,
                matched = %student_id,
                "register: face already enrolled"
            );
            return Ok(RegisterOutcome::DuplicateFace { student_id, name });
        }

        self.store.insert_face(&face)?;
        self.cache.refresh(&self.store)?;
        tracing::info!(student_id = %face.student_id, "face registered");
        Ok(RegisterOutcome::Registered)
    }

    /// Replace the embedding (and photo, when given) of an enrolled face.
    pub fn update(
        &mut self,
        student_id: &str,
        embedding: Embedding,
        photo_path: Option<String>,
    ) -> Result<(), EngineError> {
        self.check_embedding(&embedding)?;
        let mut face = self
            .store
            .get_face(student_id)?
            .ok_or_else(|| EngineError::UnknownStudent(student_id.to_string()))?;
        face.embedding = embedding;
        if photo_path.is_some() {
            face.photo_path = photo_path;
        }
        self.store.update_face(&face)?;
        self.cache.refresh(&self.store)?;
        tracing::info!(student_id, "face updated");
        Ok(())
    }

    /// Remove an enrolled face. Check-in history is kept.
    pub fn delete(&mut self, student_id: &str) -> Result<bool, EngineError> {
        let removed = self.store.delete_face(student_id)?;
        self.cache.refresh(&self.store)?;
        tracing::info!(student_id, removed, "face deleted");
        Ok(removed)
    }

    pub fn recognize(
        &mut self,
        probe: &Embedding,
        at: DateTime<Utc>,
    ) -> Result<AttendanceOutcome, EngineError> {
        let gallery = self.cache.load(&self.store)?;
        Ok(self.desk.process(&mut self.store, &gallery, probe, at)?)
    }

    pub fn load_gallery(&mut self) -> Result<usize, EngineError> {
        Ok(self.cache.load(&self.store)?.len())
    }

    pub fn faces(&self) -> Result<Vec<FaceRecord>, EngineError> {
        Ok(self.store.all_faces()?)
    }

    pub fn check_ins(&self, filter: &RecordFilter) -> Result<Vec<CheckInRecord>, EngineError> {
        Ok(self.store.check_ins(filter)?)
    }

    fn handle(&mut self, req: EngineRequest) {
        // A dropped reply receiver just means the caller stopped waiting.
        match req {
            EngineRequest::Register { face, reply } => {
                let _ = reply.send(self.register(face));
            }
            EngineRequest::Update {
                student_id,
                embedding,
                photo_path,
                reply,
            } => {
                let _ = reply.send(self.update(&student_id, embedding, photo_path));
            }
            EngineRequest::Delete { student_id, reply } => {
                let _ = reply.send(self.delete(&student_id));
            }
            EngineRequest::Recognize { probe, at, reply } => {
                let _ = reply.send(self.recognize(&probe, at));
            }
            EngineRequest::LoadGallery { reply } => {
                let _ = reply.send(self.load_gallery());
            }
            EngineRequest::Faces { reply } => {
                let _ = reply.send(self.faces());
            }
            EngineRequest::CheckIns { filter, reply } => {
                let _ = reply.send(self.check_ins(&filter));
            }
        }
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn register(&self, face: FaceRecord) -> Result<RegisterOutcome, EngineError> {
        self.request(|reply| EngineRequest::Register { face, reply }).await
    }

    pub async fn update(
        &self,
        student_id: impl Into<String>,
        embedding: Embedding,
        photo_path: Option<String>,
    ) -> Result<(), EngineError> {
        let student_id = student_id.into();
        self.request(|reply| EngineRequest::Update {
            student_id,
            embedding,
            photo_path,
            reply,
        })
        .await
    }

    pub async fn delete(&self, student_id: impl Into<String>) -> Result<bool, EngineError> {
        let student_id = student_id.into();
        self.request(|reply| EngineRequest::Delete { student_id, reply }).await
    }

    /// Recognize `probe` and record a check-in now if the cooldown allows.
    pub async fn recognize(&self, probe: Embedding) -> Result<AttendanceOutcome, EngineError> {
        self.recognize_at(probe, Utc::now()).await
    }

    pub async fn recognize_at(
        &self,
        probe: Embedding,
        at: DateTime<Utc>,
    ) -> Result<AttendanceOutcome, EngineError> {
        self.request(|reply| EngineRequest::Recognize { probe, at, reply }).await
    }

    /// Warm the gallery cache. Returns the number of enrolled faces.
    pub async fn load_gallery(&self) -> Result<usize, EngineError> {
        self.request(|reply| EngineRequest::LoadGallery { reply }).await
    }

    pub async fn faces(&self) -> Result<Vec<FaceRecord>, EngineError> {
        self.request(|reply| EngineRequest::Faces { reply }).await
    }

    pub async fn check_ins(&self, filter: RecordFilter) -> Result<Vec<CheckInRecord>, EngineError> {
        self.request(|reply| EngineRequest::CheckIns { filter, reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread exits once every [`EngineHandle`] has been dropped.
pub fn spawn_engine(mut engine: Engine) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn engine() -> Engine {
        Engine::new(
            AttendanceStore::open_in_memory().unwrap(),
            FaceMatcher::new(3),
            MatchConfig::default(),
            CheckInPolicy::from_secs(120),
        )
    }

    fn face(id: &str, name: &str, values: Vec<f32>) -> FaceRecord {
        FaceRecord {
            student_id: id.into(),
            name: name.into(),
            photo_path: None,
            embedding: Embedding::new(values),
            class_name: String::new(),
            sub_class: String::new(),
            grade: String::new(),
            sub_grade: String::new(),
            program: String::new(),
            role: String::new(),
            enrolled_at: Utc::now(),
        }
    }

    #[test]
    fn test_register_rejects_duplicate_student_id() {
        let mut engine = engine();
        assert_eq!(
            engine.register(face("S1", "Ana", vec![1.0, 0.0, 0.0])).unwrap(),
            RegisterOutcome::Registered
        );
        assert_eq!(
            engine.register(face("S1", "Other", vec![0.0, 1.0, 0.0])).unwrap(),
            RegisterOutcome::DuplicateStudentId { name: "Ana".into() }
        );
    }

    #[test]
    fn test_register_rejects_duplicate_face() {
        let mut engine = engine();
        engine.register(face("S1", "Ana", vec![1.0, 0.0, 0.0])).unwrap();
        assert_eq!(
            engine.register(face("S2", "Ana again", vec![0.99, 0.02, 0.0])).unwrap(),
            RegisterOutcome::DuplicateFace { student_id: "S1".into(), name: "Ana".into() }
        );
        assert_eq!(engine.faces().unwrap().len(), 1);
    }

    #[test]
    fn test_register_rejects_wrong_embedding_size() {
        let mut engine = engine();
        let err = engine.register(face("S1", "Ana", vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, EngineError::Match(MatchError::ProbeDimension { .. })));
    }

    #[test]
    fn test_registration_refreshes_gallery() {
        let mut engine = engine();
        let probe = Embedding::new(vec![0.0, 1.0, 0.0]);
        let now = Utc::now();
        assert_eq!(engine.recognize(&probe, now).unwrap(), AttendanceOutcome::NotRecognized);

        engine.register(face("S2", "Budi", vec![0.0, 1.0, 0.0])).unwrap();
        assert_eq!(engine.recognize(&probe, now).unwrap().student_id(), Some("S2"));
    }

    #[test]
    fn test_update_and_delete_refresh_gallery() {
        let mut engine = engine();
        engine.register(face("S1", "Ana", vec![1.0, 0.0, 0.0])).unwrap();
        let t0 = Utc::now();

        let new_look = Embedding::new(vec![0.0, 0.0, 1.0]);
        engine.update("S1", new_look.clone(), Some("/faces/S1-v2.jpg".into())).unwrap();
        assert_eq!(engine.recognize(&new_look, t0).unwrap().student_id(), Some("S1"));
        assert_eq!(
            engine.faces().unwrap()[0].photo_path.as_deref(),
            Some("/faces/S1-v2.jpg")
        );

        assert!(engine.delete("S1").unwrap());
        assert_eq!(
            engine.recognize(&new_look, t0 + TimeDelta::minutes(5)).unwrap(),
            AttendanceOutcome::NotRecognized
        );
        assert_eq!(engine.check_ins(&RecordFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_update_unknown_student() {
        let mut engine = engine();
        let err = engine.update("S404", Embedding::new(vec![1.0, 0.0, 0.0]), None).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStudent(id) if id == "S404"));
    }

    #[test]
    fn test_update_rejects_wrong_embedding_size() {
        let mut engine = engine();
        engine.register(face("S1", "Ana", vec![1.0, 0.0, 0.0])).unwrap();
        engine.register(face("S2", "Budi", vec![0.0, 1.0, 0.0])).unwrap();

        let err = engine.update("S2", Embedding::new(vec![1.0, 0.0]), None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Match(MatchError::ProbeDimension { expected: 3, actual: 2 })
        ));

        let stored = engine.store.get_face("S2").unwrap().unwrap();
        assert_eq!(stored.embedding.values, vec![0.0, 1.0, 0.0]);

        let now = Utc::now();
        let outcome = engine.recognize(&Embedding::new(vec![1.0, 0.0, 0.0]), now).unwrap();
        assert_eq!(outcome.student_id(), Some("S1"));
        assert_eq!(
            engine.register(face("S3", "Citra", vec![0.0, 0.0, 1.0])).unwrap(),
            RegisterOutcome::Registered
        );
    }
}
