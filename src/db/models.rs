use serde::{Deserialize, Serialize};

/// A catalog entry: one piece of audio and where to fetch it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Row id, 0 until the track has been persisted.
    pub id: i64,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub cover_image_url: Option<String>,
    /// Public URL of the placed audio file, empty until placement.
    pub audio_file_url: String,
    pub emotion: Option<Emotion>,
}

/// Affective character of a track (Russell circumplex), both axes in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    pub valence: f64,
    pub arousal: f64,
}

impl Emotion {
    /// Both axes inside [0, 1] (NaN is rejected).
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.valence) && (0.0..=1.0).contains(&self.arousal)
    }

    /// Build an emotion from nullable columns; half-set pairs count as absent.
    pub fn from_columns(valence: Option<f64>, arousal: Option<f64>) -> Option<Self> {
        match (valence, arousal) {
            (Some(valence), Some(arousal)) => Some(Self { valence, arousal }),
            _ => None,
        }
    }
}

/// Library-wide counters for the `stats` command.
#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub total_tracks: i64,
    pub with_emotion: i64,
    pub artists: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_range() {
        assert!(Emotion { valence: 0.0, arousal: 1.0 }.is_valid());
        assert!(!Emotion { valence: -0.1, arousal: 0.5 }.is_valid());
        assert!(!Emotion { valence: 0.5, arousal: 1.01 }.is_valid());
        assert!(!Emotion { valence: f64::NAN, arousal: 0.5 }.is_valid());
    }

    #[test]
    fn test_emotion_from_columns() {
        assert_eq!(
            Emotion::from_columns(Some(0.2), Some(0.8)),
            Some(Emotion { valence: 0.2, arousal: 0.8 })
        );
        assert_eq!(Emotion::from_columns(Some(0.2), None), None);
        assert_eq!(Emotion::from_columns(None, None), None);
    }

    #[test]
    fn test_track_json_shape() {
        let track = Track {
            id: 7,
            name: "Song".into(),
            emotion: Some(Emotion { valence: 0.1, arousal: 0.9 }),
            ..Default::default()
        };
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["emotion"]["arousal"], 0.9);
        assert!(json["cover_image_url"].is_null());
    }
}
