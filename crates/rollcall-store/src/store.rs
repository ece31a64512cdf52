use crate::codec::{blob_to_embedding, embedding_to_blob, millis_to_utc, CodecError};
use crate::filter::RecordFilter;
use chrono::{DateTime, Utc};
use rollcall_core::{
    AttendanceLedger, Attendee, CheckInAttempt, CheckInPolicy, CheckInRecord, Classification,
    Embedding, FaceRecord, Gallery,
};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS faces (
    student_id    TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    photo_path    TEXT,
    embedding     BLOB NOT NULL,
    model_version TEXT,
    class_name    TEXT NOT NULL DEFAULT '',
    sub_class     TEXT NOT NULL DEFAULT '',
    grade         TEXT NOT NULL DEFAULT '',
    sub_grade     TEXT NOT NULL DEFAULT '',
    program       TEXT NOT NULL DEFAULT '',
    role          TEXT NOT NULL DEFAULT '',
    enrolled_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS check_in_records (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id   TEXT NOT NULL,
    name         TEXT NOT NULL,
    timestamp    INTEGER NOT NULL,
    class_id     INTEGER,
    sub_class_id INTEGER,
    grade_id     INTEGER,
    sub_grade_id INTEGER,
    program_id   INTEGER,
    role_id      INTEGER,
    class_name   TEXT,
    grade_name   TEXT
);

CREATE INDEX IF NOT EXISTS idx_check_in_student_time
    ON check_in_records (student_id, timestamp DESC);
";

const FACE_COLUMNS: &str = "student_id, name, photo_path, embedding, model_version, \
     class_name, sub_class, grade, sub_grade, program, role, enrolled_at";

const RECORD_COLUMNS: &str = "id, student_id, name, timestamp, class_id, sub_class_id, grade_id, \
     sub_grade_id, program_id, role_id, class_name, grade_name";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[source] rusqlite::Error),
    #[error("corrupt embedding in column {column}: {len} bytes")]
    CorruptEmbedding { column: usize, len: usize },
    #[error("invalid stored timestamp in column {column}: {millis} ms")]
    InvalidTimestamp { column: usize, millis: i64 },
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(column, ty, source) => {
                match source.downcast::<CodecError>() {
                    Ok(codec) => match *codec {
                        CodecError::EmbeddingBlob { len } => {
                            StoreError::CorruptEmbedding { column, len }
                        }
                        CodecError::Timestamp { millis } => {
                            StoreError::InvalidTimestamp { column, millis }
                        }
                    },
                    Err(source) => StoreError::Sqlite(
                        rusqlite::Error::FromSqlConversionFailure(column, ty, source),
                    ),
                }
            }
            other => StoreError::Sqlite(other),
        }
    }
}

/// SQLite-backed face and attendance store.
pub struct AttendanceStore {
    conn: Connection,
}

impl AttendanceStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // Other processes may hold the write lock briefly during check-in.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // --- Enrolled faces ---

    /// Insert a new enrolled face. Fails on an existing student id.
    pub fn insert_face(&self, face: &FaceRecord) -> Result<(), StoreError> {
        self.conn.execute(
            &format!("INSERT INTO faces ({FACE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                face.student_id,
                face.name,
                face.photo_path,
                embedding_to_blob(&face.embedding.values),
                face.embedding.model_version,
                face.class_name,
                face.sub_class,
                face.grade,
                face.sub_grade,
                face.program,
                face.role,
                face.enrolled_at.timestamp_millis(),
            ],
        )?;
        tracing::debug!(student_id = %face.student_id, "face inserted");
        Ok(())
    }

    /// Replace every field of an enrolled face. Returns false if it does not exist.
    pub fn update_face(&self, face: &FaceRecord) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE faces SET name = ?2, photo_path = ?3, embedding = ?4, model_version = ?5,
                 class_name = ?6, sub_class = ?7, grade = ?8, sub_grade = ?9, program = ?10,
                 role = ?11, enrolled_at = ?12
             WHERE student_id = ?1",
            params![
                face.student_id,
                face.name,
                face.photo_path,
                embedding_to_blob(&face.embedding.values),
                face.embedding.model_version,
                face.class_name,
                face.sub_class,
                face.grade,
                face.sub_grade,
                face.program,
                face.role,
                face.enrolled_at.timestamp_millis(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_face(&self, student_id: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM faces WHERE student_id = ?1", params![student_id])?;
        Ok(changed > 0)
    }

    pub fn get_face(&self, student_id: &str) -> Result<Option<FaceRecord>, StoreError> {
        let face = self
            .conn
            .query_row(
                &format!("SELECT {FACE_COLUMNS} FROM faces WHERE student_id = ?1"),
                params![student_id],
                face_from_row,
            )
            .optional()?;
        Ok(face)
    }

    pub fn all_faces(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FACE_COLUMNS} FROM faces ORDER BY student_id"))?;
        let faces = stmt
            .query_map([], face_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(faces)
    }

    /// Snapshot of every enrolled embedding, keyed by student id.
    pub fn load_gallery(&self) -> Result<Gallery, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id, embedding, model_version FROM faces")?;
        let gallery = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                let embedding = Embedding {
                    values: blob_to_embedding(&blob, 1)?,
                    model_version: row.get(2)?,
                };
                Ok((id, embedding))
            })?
            .collect::<rusqlite::Result<Gallery>>()?;
        tracing::debug!(faces = gallery.len(), "gallery loaded");
        Ok(gallery)
    }

    // --- Check-in records ---

    pub fn last_check_in_time(&self, student_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        last_check_in_on(&self.conn, student_id)
    }

    /// Unconditionally append a check-in record. Returns the new row id.
    pub fn insert_check_in(&self, record: &CheckInRecord) -> Result<i64, StoreError> {
        insert_check_in_on(&self.conn, record)
    }

    /// Check-then-insert as one `IMMEDIATE` transaction: the write lock is
    /// taken before the last check-in is read, so concurrent writers on
    /// the same database cannot both pass the cooldown.
    pub fn try_check_in(
        &mut self,
        record: &CheckInRecord,
        policy: &CheckInPolicy,
    ) -> Result<CheckInAttempt, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let last = last_check_in_on(&tx, &record.student_id)?;
        let decision = policy.evaluate(last, record.timestamp);
        if !decision.is_allowed() {
            tx.rollback()?;
            return Ok(CheckInAttempt::CoolingDown {
                remaining_seconds: decision.remaining_seconds(),
            });
        }
        let id = insert_check_in_on(&tx, record)?;
        tx.commit()?;
        tracing::debug!(student_id = %record.student_id, id, "check-in inserted");
        Ok(CheckInAttempt::Recorded { id })
    }

    /// Records matching `filter`, newest first.
    pub fn check_ins(&self, filter: &RecordFilter) -> Result<Vec<CheckInRecord>, StoreError> {
        let c = &filter.classification;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM check_in_records
             WHERE (:name IS NULL OR name LIKE '%' || :name || '%')
               AND (:start IS NULL OR timestamp >= :start)
               AND (:end IS NULL OR timestamp <= :end)
               AND (:class_id IS NULL OR class_id = :class_id)
               AND (:sub_class_id IS NULL OR sub_class_id = :sub_class_id)
               AND (:grade_id IS NULL OR grade_id = :grade_id)
               AND (:sub_grade_id IS NULL OR sub_grade_id = :sub_grade_id)
               AND (:program_id IS NULL OR program_id = :program_id)
               AND (:role_id IS NULL OR role_id = :role_id)
             ORDER BY timestamp DESC, id DESC"
        ))?;
        let records = stmt
            .query_map(
                named_params! {
                    ":name": filter.name_pattern(),
                    ":start": filter.from.map(|t| t.timestamp_millis()),
                    ":end": filter.to.map(|t| t.timestamp_millis()),
                    ":class_id": c.class_id,
                    ":sub_class_id": c.sub_class_id,
                    ":grade_id": c.grade_id,
                    ":sub_grade_id": c.sub_grade_id,
                    ":program_id": c.program_id,
                    ":role_id": c.role_id,
                },
                record_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn delete_check_in(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM check_in_records WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

impl AttendanceLedger for AttendanceStore {
    type Error = StoreError;

    fn attendee(&mut self, student_id: &str) -> Result<Option<Attendee>, StoreError> {
        Ok(self.get_face(student_id)?.map(|face| face.attendee()))
    }

    fn last_check_in(&mut self, student_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.last_check_in_time(student_id)
    }

    fn try_check_in(
        &mut self,
        record: &CheckInRecord,
        policy: &CheckInPolicy,
    ) -> Result<CheckInAttempt, StoreError> {
        AttendanceStore::try_check_in(self, record, policy)
    }
}

fn last_check_in_on(conn: &Connection, student_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let ms: Option<i64> = conn
        .query_row(
            "SELECT MAX(timestamp) FROM check_in_records WHERE student_id = ?1",
            params![student_id],
            |row| row.get(0),
        )?;
    Ok(ms.map(|ms| millis_to_utc(ms, 0)).transpose()?)
}

fn insert_check_in_on(conn: &Connection, record: &CheckInRecord) -> Result<i64, StoreError> {
    let c = &record.classification;
    conn.execute(
        &format!("INSERT INTO check_in_records ({RECORD_COLUMNS}) VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            record.student_id,
            record.name,
            record.timestamp.timestamp_millis(),
            c.class_id,
            c.sub_class_id,
            c.grade_id,
            c.sub_grade_id,
            c.program_id,
            c.role_id,
            record.class_name,
            record.grade_name,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn face_from_row(row: &Row<'_>) -> rusqlite::Result<FaceRecord> {
    let blob: Vec<u8> = row.get(3)?;
    Ok(FaceRecord {
        student_id: row.get(0)?,
        name: row.get(1)?,
        photo_path: row.get(2)?,
        embedding: Embedding {
            values: blob_to_embedding(&blob, 3)?,
            model_version: row.get(4)?,
        },
        class_name: row.get(5)?,
        sub_class: row.get(6)?,
        grade: row.get(7)?,
        sub_grade: row.get(8)?,
        program: row.get(9)?,
        role: row.get(10)?,
        enrolled_at: millis_to_utc(row.get(11)?, 11)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CheckInRecord> {
    Ok(CheckInRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        name: row.get(2)?,
        timestamp: millis_to_utc(row.get(3)?, 3)?,
        classification: Classification {
            class_id: row.get(4)?,
            sub_class_id: row.get(5)?,
            grade_id: row.get(6)?,
            sub_grade_id: row.get(7)?,
            program_id: row.get(8)?,
            role_id: row.get(9)?,
        },
        class_name: row.get(10)?,
        grade_name: row.get(11)?,
    })
}
