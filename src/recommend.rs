//! Emotion-based recommendation ("murecom").
//!
//! Retrieval: tracks whose valence and arousal are both within 0.3 of the
//! request. Scoring: Euclidean distance in the valence/arousal plane,
//! nearest first, ties by id. No re-ranking.

use thiserror::Error;

use crate::db::models::{Emotion, Track};
use crate::db::{Database, DbError};

/// Half-width of the square retrieval window around the requested emotion.
pub const EMOTION_WINDOW: f64 = 0.3;
pub const DEFAULT_LIMIT: i64 = 3;
pub const MAX_LIMIT: i64 = 100;

#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("Valence and arousal are required")]
    MissingEmotion,
    #[error("Valence and arousal must be in [0, 1], got ({valence}, {arousal})")]
    OutOfRange { valence: f64, arousal: f64 },
    #[error("Limit must be in [1, 100], got {0}")]
    Limit(i64),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

impl RecommendError {
    /// Rejected before touching the database.
    pub fn is_invalid_request(&self) -> bool {
        !matches!(self, Self::Db(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecommendRequest {
    pub valence: f64,
    pub arousal: f64,
    /// 0 selects the default of 3
    pub limit: i64,
}

impl RecommendRequest {
    /// Check ranges and resolve the default limit.
    pub fn validate(&self) -> Result<(Emotion, i64), RecommendError> {
        let target = Emotion {
            valence: self.valence,
            arousal: self.arousal,
        };
        if !target.is_valid() {
            return Err(RecommendError::OutOfRange {
                valence: self.valence,
                arousal: self.arousal,
            });
        }
        let limit = match self.limit {
            0 => DEFAULT_LIMIT,
            n if (1..=MAX_LIMIT).contains(&n) => n,
            n => return Err(RecommendError::Limit(n)),
        };
        Ok((target, limit))
    }
}

/// Tracks closest to the requested emotion. Unanalyzed tracks never match.
pub fn recommend(db: &Database, req: &RecommendRequest) -> Result<Vec<Track>, RecommendError> {
    let (target, limit) = req.validate()?;
    log::debug!(
        "murecom: valence={}, arousal={}, limit={}",
        target.valence,
        target.arousal,
        limit
    );
    Ok(db.tracks_near_emotion(target, EMOTION_WINDOW, limit)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(db: &Database, name: &str, emotion: Option<(f64, f64)>) -> i64 {
        let mut t = Track {
            name: name.to_string(),
            artist: "Artist".to_string(),
            emotion: emotion.map(|(valence, arousal)| Emotion { valence, arousal }),
            ..Default::default()
        };
        db.create_track_if_absent(&mut t).unwrap();
        t.id
    }

    fn req(valence: f64, arousal: f64, limit: i64) -> RecommendRequest {
        RecommendRequest {
            valence,
            arousal,
            limit,
        }
    }

    #[test]
    fn test_only_tracks_inside_window() {
        let db = Database::open_in_memory().unwrap();
        let center = seed(&db, "center", Some((0.5, 0.5)));
        seed(&db, "high", Some((0.9, 0.9)));
        seed(&db, "low", Some((0.1, 0.1)));

        let found = recommend(&db, &req(0.5, 0.5, 3)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, center);
    }

    #[test]
    fn test_window_applies_to_both_axes() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "valence_off", Some((0.8, 0.5)));
        seed(&db, "arousal_off", Some((0.4, 0.1)));
        seed(&db, "inside", Some((0.6, 0.6)));

        let names: Vec<String> = recommend(&db, &req(0.4, 0.5, 0))
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["inside"]);
    }

    #[test]
    fn test_default_limit_and_unanalyzed_tracks() {
        let db = Database::open_in_memory().unwrap();
        for (i, v) in [0.5, 0.51, 0.52, 0.53, 0.54].into_iter().enumerate() {
            seed(&db, &format!("t{i}"), Some((v, 0.5)));
        }
        seed(&db, "unanalyzed", None);

        let found = recommend(&db, &req(0.5, 0.5, 0)).unwrap();
        let names: Vec<&str> = found.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["t0", "t1", "t2"]);
    }

    #[test]
    fn test_rejects_bad_requests() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            recommend(&db, &req(1.2, 0.5, 3)),
            Err(RecommendError::OutOfRange { .. })
        ));
        assert!(matches!(
            recommend(&db, &req(0.5, -0.1, 3)),
            Err(RecommendError::OutOfRange { .. })
        ));
        assert!(matches!(recommend(&db, &req(0.5, 0.5, 101)), Err(RecommendError::Limit(101))));
        assert!(matches!(recommend(&db, &req(0.5, 0.5, -1)), Err(RecommendError::Limit(-1))));
        assert!(RecommendError::Limit(0).is_invalid_request());
    }

    #[test]
    fn test_limit_bounds_accepted() {
        assert_eq!(req(0.0, 1.0, 1).validate().unwrap().1, 1);
        assert_eq!(req(0.0, 1.0, 100).validate().unwrap().1, 100);
        assert_eq!(req(0.0, 1.0, 0).validate().unwrap().1, DEFAULT_LIMIT);
    }
}
