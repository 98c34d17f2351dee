//! Effect send settings shared between the control and audio sides

use serde::{Deserialize, Serialize};

/// Longest supported delay tap
pub const MAX_DELAY_SECS: f32 = 2.0;
/// Feedback must stay below unity or the delay line diverges
pub const MAX_FEEDBACK: f32 = 0.95;

/// Reverb send settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbSettings {
    pub enabled: bool,
    /// Wet level, 0.0..=1.0
    pub mix: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mix: 0.3,
        }
    }
}

/// Delay send settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySettings {
    pub enabled: bool,
    /// Wet level, 0.0..=1.0
    pub mix: f32,
    /// Tap time in seconds, capped at MAX_DELAY_SECS
    pub time_secs: f32,
    /// Fraction of the tap fed back, 0.0..MAX_FEEDBACK
    pub feedback: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mix: 0.25,
            time_secs: 0.375,
            feedback: 0.35,
        }
    }
}

/// Process-wide effect state, mutated only through patches
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectSettings {
    pub reverb: ReverbSettings,
    pub delay: DelaySettings,
}

/// Partial update for the reverb send
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReverbPatch {
    pub enabled: Option<bool>,
    pub mix: Option<f32>,
}

/// Partial update for the delay send
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DelayPatch {
    pub enabled: Option<bool>,
    pub mix: Option<f32>,
    pub time_secs: Option<f32>,
    pub feedback: Option<f32>,
}

impl EffectSettings {
    /// Merge a reverb patch, clamping values into range
    pub fn apply_reverb(&mut self, patch: ReverbPatch) {
        if let Some(enabled) = patch.enabled {
            self.reverb.enabled = enabled;
        }
        if let Some(mix) = patch.mix {
            self.reverb.mix = mix.clamp(0.0, 1.0);
        }
    }

    /// Merge a delay patch, clamping values into range
    pub fn apply_delay(&mut self, patch: DelayPatch) {
        if let Some(enabled) = patch.enabled {
            self.delay.enabled = enabled;
        }
        if let Some(mix) = patch.mix {
            self.delay.mix = mix.clamp(0.0, 1.0);
        }
        if let Some(time_secs) = patch.time_secs {
            self.delay.time_secs = time_secs.clamp(0.001, MAX_DELAY_SECS);
        }
        if let Some(feedback) = patch.feedback {
            self.delay.feedback = feedback.clamp(0.0, MAX_FEEDBACK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_merges_only_set_fields() {
        let mut settings = EffectSettings::default();
        settings.apply_reverb(ReverbPatch {
            enabled: Some(true),
            mix: None,
        });
        assert!(settings.reverb.enabled);
        assert_eq!(settings.reverb.mix, ReverbSettings::default().mix);
    }

    #[test]
    fn test_delay_clamps() {
        let mut settings = EffectSettings::default();
        settings.apply_delay(DelayPatch {
            enabled: Some(true),
            mix: Some(2.0),
            time_secs: Some(10.0),
            feedback: Some(1.0),
        });
        assert_eq!(settings.delay.mix, 1.0);
        assert_eq!(settings.delay.time_secs, MAX_DELAY_SECS);
        assert!(settings.delay.feedback < 1.0);
    }

    #[test]
    fn test_zero_delay_time_raised_to_minimum() {
        let mut settings = EffectSettings::default();
        settings.apply_delay(DelayPatch {
            time_secs: Some(0.0),
            ..Default::default()
        });
        assert!(settings.delay.time_secs > 0.0);
    }
}
