use crate::{error::ValidationError, types::MoodSnapshot};

const HIGH_THRESHOLD: f64 = 0.6;
const LOW_THRESHOLD: f64 = 0.4;
const NEUTRAL_POINT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodPoint {
    pub valence: f64,
    pub arousal: f64,
}

impl MoodPoint {
    pub fn new(valence: f64, arousal: f64) -> Self {
        Self { valence, arousal }
    }

    pub fn neutral() -> Self {
        Self::new(NEUTRAL_POINT, NEUTRAL_POINT)
    }

    pub fn describe(&self) -> &'static str {
        describe_mood(self.valence, self.arousal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoodSource {
    Current,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedMood {
    pub source: MoodSource,
    pub point: MoodPoint,
}

/// Four-quadrant descriptor. Thresholds are strict: 0.6 is not "high" and 0.4
/// is not "low".
pub fn describe_mood(valence: f64, arousal: f64) -> &'static str {
    if arousal > HIGH_THRESHOLD && valence > HIGH_THRESHOLD {
        "Happy & Energetic"
    } else if arousal > HIGH_THRESHOLD && valence < LOW_THRESHOLD {
        "Angry & Intense"
    } else if arousal < LOW_THRESHOLD && valence > HIGH_THRESHOLD {
        "Calm & Peaceful"
    } else if arousal < LOW_THRESHOLD && valence < LOW_THRESHOLD {
        "Sad & Melancholic"
    } else {
        "Neutral & Balanced"
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

fn usable_snapshot(snapshot: &MoodSnapshot) -> Option<MoodPoint> {
    let valence = unit_interval("valence", snapshot.valence).ok()?;
    let arousal = unit_interval("arousal", snapshot.arousal).ok()?;
    Some(MoodPoint::new(valence, arousal))
}

/// Picks the mood a generation request is based on: the detected snapshot when
/// `use_current` is set, the custom slider values otherwise.
pub fn resolve_mood(
    current: Option<&MoodSnapshot>,
    use_current: bool,
    custom: MoodPoint,
) -> Result<ResolvedMood, ValidationError> {
    if use_current {
        let point = current.and_then(usable_snapshot).ok_or(ValidationError::NoCurrentMood)?;
        return Ok(ResolvedMood { source: MoodSource::Current, point });
    }
    let point = MoodPoint::new(
        unit_interval("valence", custom.valence)?,
        unit_interval("arousal", custom.arousal)?,
    );
    Ok(ResolvedMood { source: MoodSource::Custom, point })
}

pub fn can_submit(current: Option<&MoodSnapshot>, use_current: bool) -> bool {
    !use_current || current.and_then(usable_snapshot).is_some()
}

/// Starting point for the custom sliders: the detected mood when there is one.
pub fn seed_custom(current: Option<&MoodSnapshot>) -> MoodPoint {
    current.and_then(usable_snapshot).unwrap_or_else(MoodPoint::neutral)
}

pub fn current_mood_label(current: Option<&MoodSnapshot>) -> String {
    match current {
        Some(snapshot) => format!("Use Current Mood ({})", snapshot.emotion),
        None => "Use Current Mood (No mood detected)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(valence: f64, arousal: f64) -> MoodSnapshot {
        MoodSnapshot {
            emotion: "happy".into(),
            valence,
            arousal,
            timestamp: None,
            source: Some("image".into()),
        }
    }

    #[test]
    fn describes_each_quadrant() {
        assert_eq!(describe_mood(0.8, 0.9), "Happy & Energetic");
        assert_eq!(describe_mood(0.1, 0.8), "Angry & Intense");
        assert_eq!(describe_mood(0.9, 0.2), "Calm & Peaceful");
        assert_eq!(describe_mood(0.2, 0.3), "Sad & Melancholic");
        assert_eq!(describe_mood(0.5, 0.5), "Neutral & Balanced");
    }

    #[test]
    fn thresholds_are_exclusive() {
        assert_eq!(describe_mood(0.9, 0.6), "Neutral & Balanced");
        assert_eq!(describe_mood(0.6, 0.9), "Neutral & Balanced");
        assert_eq!(describe_mood(0.4, 0.9), "Neutral & Balanced");
        assert_eq!(describe_mood(0.9, 0.4), "Neutral & Balanced");
        assert_eq!(describe_mood(0.4, 0.4), "Neutral & Balanced");
        assert_eq!(describe_mood(0.39, 0.39), "Sad & Melancholic");
        assert_eq!(describe_mood(0.61, 0.61), "Happy & Energetic");
    }

    #[test]
    fn corners_of_the_unit_square() {
        assert_eq!(describe_mood(0.0, 0.0), "Sad & Melancholic");
        assert_eq!(describe_mood(1.0, 1.0), "Happy & Energetic");
        assert_eq!(describe_mood(0.0, 1.0), "Angry & Intense");
        assert_eq!(describe_mood(1.0, 0.0), "Calm & Peaceful");
    }

    #[test]
    fn every_grid_point_gets_a_known_label() {
        let labels = [
            "Happy & Energetic",
            "Angry & Intense",
            "Calm & Peaceful",
            "Sad & Melancholic",
            "Neutral & Balanced",
        ];
        for v in 0..=100 {
            for a in 0..=100 {
                let label = describe_mood(v as f64 / 100.0, a as f64 / 100.0);
                assert!(labels.contains(&label));
            }
        }
    }

    #[test]
    fn current_mood_requires_a_snapshot() {
        let err = resolve_mood(None, true, MoodPoint::neutral()).unwrap_err();
        assert_eq!(err, ValidationError::NoCurrentMood);
        assert!(!can_submit(None, true));
        assert!(can_submit(None, false));
    }

    #[test]
    fn current_mood_uses_snapshot_values() {
        let mood = snapshot(0.7, 0.2);
        let resolved = resolve_mood(Some(&mood), true, MoodPoint::new(0.0, 0.0)).unwrap();
        assert_eq!(resolved.source, MoodSource::Current);
        assert_eq!(resolved.point, MoodPoint::new(0.7, 0.2));
    }

    #[test]
    fn malformed_snapshot_counts_as_missing() {
        let mood = snapshot(f64::NAN, 0.5);
        assert!(!can_submit(Some(&mood), true));
        assert_eq!(seed_custom(Some(&mood)), MoodPoint::neutral());
    }

    #[test]
    fn custom_values_must_be_in_range() {
        let err = resolve_mood(None, false, MoodPoint::new(1.2, 0.5)).unwrap_err();
        assert_eq!(err, ValidationError::OutOfRange { field: "valence", value: 1.2 });
        let err = resolve_mood(None, false, MoodPoint::new(0.5, -0.1)).unwrap_err();
        assert_eq!(err, ValidationError::OutOfRange { field: "arousal", value: -0.1 });
    }

    #[test]
    fn sliders_are_seeded_from_the_detected_mood() {
        let mood = snapshot(0.3, 0.8);
        assert_eq!(seed_custom(Some(&mood)), MoodPoint::new(0.3, 0.8));
        assert_eq!(seed_custom(None), MoodPoint::neutral());
        assert_eq!(current_mood_label(Some(&mood)), "Use Current Mood (happy)");
    }
}
