use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::distance;

/// Face embedding vector (512-dimensional for the bundled model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine distance to `other` in [0, 2]. 0 = identical direction.
    ///
    /// # Panics
    ///
    /// Panics if the two embeddings differ in length.
    pub fn distance(&self, other: &Embedding) -> f32 {
        distance::cosine_distance(&self.values, &other.values)
    }

    /// Copy of this embedding scaled to unit L2 norm. Zero vectors are returned unchanged.
    pub fn l2_normalized(&self) -> Embedding {
        Embedding {
            values: distance::l2_normalize(&self.values),
            model_version: self.model_version.clone(),
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Snapshot of enrolled faces keyed by identity (student id).
///
/// Iteration is ordered by identity, so matcher tie-breaks on exactly equal
/// distances resolve to the lexicographically smallest identity.
/// Inserting an existing identity replaces its embedding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: BTreeMap<String, Embedding>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: impl Into<String>, embedding: Embedding) -> Option<Embedding> {
        self.entries.insert(identity.into(), embedding)
    }

    pub fn get(&self, identity: &str) -> Option<&Embedding> {
        self.entries.get(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.entries.iter().map(|(id, emb)| (id.as_str(), emb))
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, Embedding)> for Gallery {
    fn from_iter<I: IntoIterator<Item = (S, Embedding)>>(iter: I) -> Self {
        let mut gallery = Gallery::new();
        for (id, emb) in iter {
            gallery.insert(id, emb);
        }
        gallery
    }
}

/// An enrolled face with its registration metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub student_id: String,
    pub name: String,
    pub photo_path: Option<String>,
    pub embedding: Embedding,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub sub_class: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub sub_grade: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub role: String,
    pub enrolled_at: DateTime<Utc>,
}

impl FaceRecord {
    /// Display attributes copied onto each check-in record for this face.
    pub fn attendee(&self) -> Attendee {
        Attendee {
            name: self.name.clone(),
            class_name: non_empty(&self.class_name),
            grade_name: non_empty(&self.grade),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Who a check-in record is written for, as resolved from the enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub class_name: Option<String>,
    pub grade_name: Option<String>,
}

/// Optional classification ids attached to a check-in record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub class_id: Option<i64>,
    pub sub_class_id: Option<i64>,
    pub grade_id: Option<i64>,
    pub sub_grade_id: Option<i64>,
    pub program_id: Option<i64>,
    pub role_id: Option<i64>,
}

/// An accepted attendance event. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRecord {
    /// Row id assigned by the store; `None` until persisted.
    pub id: Option<i64>,
    pub student_id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub classification: Classification,
    pub class_name: Option<String>,
    pub grade_name: Option<String>,
}

impl CheckInRecord {
    pub fn new(student_id: impl Into<String>, attendee: Attendee, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            student_id: student_id.into(),
            name: attendee.name,
            timestamp,
            classification: Classification::default(),
            class_name: attendee.class_name,
            grade_name: attendee.grade_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gallery_last_write_wins() {
        let mut gallery = Gallery::new();
        gallery.insert("S1", Embedding::new(vec![1.0, 0.0]));
        let prev = gallery.insert("S1", Embedding::new(vec![0.0, 1.0]));
        assert_eq!(prev, Some(Embedding::new(vec![1.0, 0.0])));
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.get("S1").map(|e| e.values.clone()), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_gallery_iterates_in_identity_order() {
        let gallery: Gallery = vec![
            ("b", Embedding::new(vec![1.0])),
            ("a", Embedding::new(vec![1.0])),
            ("c", Embedding::new(vec![1.0])),
        ]
        .into_iter()
        .collect();
        assert_eq!(gallery.identities().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_attendee_drops_blank_labels() {
        let face = FaceRecord {
            student_id: "S1".into(),
            name: "Ana".into(),
            photo_path: None,
            embedding: Embedding::new(vec![1.0]),
            class_name: "7A".into(),
            sub_class: String::new(),
            grade: String::new(),
            sub_grade: String::new(),
            program: String::new(),
            role: String::new(),
            enrolled_at: Utc::now(),
        };
        let attendee = face.attendee();
        assert_eq!(attendee.name, "Ana");
        assert_eq!(attendee.class_name.as_deref(), Some("7A"));
        assert_eq!(attendee.grade_name, None);
    }
}
