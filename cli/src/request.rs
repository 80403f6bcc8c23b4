use crate::{
    error::ValidationError,
    mood::{resolve_mood, MoodPoint, MoodSource},
    types::{GenerationParameters, MoodSnapshot, MusicStyle},
};

pub const MIN_DURATION_SECONDS: u32 = 15;
pub const MAX_DURATION_SECONDS: u32 = 120;
pub const DEFAULT_DURATION_SECONDS: u32 = 30;
pub const MIN_TEMPO_BPM: u32 = 60;
pub const MAX_TEMPO_BPM: u32 = 180;
pub const DEFAULT_TEMPO_BPM: u32 = 120;

/// What the user picked on the generation form.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationForm {
    pub use_current_mood: bool,
    pub custom: MoodPoint,
    pub duration_seconds: u32,
    pub tempo_bpm: u32,
    pub style: MusicStyle,
}

impl Default for GenerationForm {
    fn default() -> Self {
        Self {
            use_current_mood: true,
            custom: MoodPoint::neutral(),
            duration_seconds: DEFAULT_DURATION_SECONDS,
            tempo_bpm: DEFAULT_TEMPO_BPM,
            style: MusicStyle::Auto,
        }
    }
}

impl GenerationForm {
    pub fn from_current_mood() -> Self {
        Self::default()
    }

    pub fn custom(valence: f64, arousal: f64) -> Self {
        Self { use_current_mood: false, custom: MoodPoint::new(valence, arousal), ..Self::default() }
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_tempo(mut self, bpm: u32) -> Self {
        self.tempo_bpm = bpm;
        self
    }

    pub fn with_style(mut self, style: MusicStyle) -> Self {
        self.style = style;
        self
    }

    pub fn mood_label(&self, current: Option<&MoodSnapshot>) -> &'static str {
        match resolve_mood(current, self.use_current_mood, self.custom) {
            Ok(resolved) => resolved.point.describe(),
            Err(_) => self.custom.describe(),
        }
    }

    /// Builds the request body. Mood values are only sent for custom moods;
    /// with the current mood the service looks the snapshot up itself.
    pub fn build(
        &self,
        current: Option<&MoodSnapshot>,
    ) -> Result<GenerationParameters, ValidationError> {
        let resolved = resolve_mood(current, self.use_current_mood, self.custom)?;
        let (valence, arousal) = match resolved.source {
            MoodSource::Current => (None, None),
            MoodSource::Custom => (Some(resolved.point.valence), Some(resolved.point.arousal)),
        };
        Ok(GenerationParameters {
            use_current_mood: resolved.source == MoodSource::Current,
            valence,
            arousal,
            duration: self.duration_seconds.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS),
            tempo: self.tempo_bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM),
            style: self.style,
        })
    }
}
