//! Audible alarm controller.
//!
//! While any parameter is ACTIVE and the user has not muted sound, every tick
//! yields an [`AudioCue`]. Each cue carries a fresh nonce in its URL; without
//! it the browser treats repeated identical audio sources as one event and
//! stays silent.

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use serde::Serialize;

// ---

/// Path the page loads the alarm tone from.
pub const BEEP_PATH: &str = "/assets/beep.wav";

const SAMPLE_RATE: u32 = 8_000;
const TONE_HZ: f64 = 2_500.0;
const TONE_MILLIS: u32 = 400;

/// The alarm tone as an 8-bit mono PCM WAV file.
pub static BEEP_WAV: Lazy<Vec<u8>> = Lazy::new(synthesize_beep);

/// Fire-and-forget instruction for the page to play the alarm tone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioCue {
    pub nonce: String,
    pub src: String,
}

#[derive(Debug, Default)]
pub struct AudibleAlarm {
    emitted: u64,
}

impl AudibleAlarm {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cues emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Emit a cue iff `any_active && sound_allowed`.
    pub fn evaluate(
        &mut self,
        any_active: bool,
        sound_allowed: bool,
        at: DateTime<Local>,
    ) -> Option<AudioCue> {
        // ---
        if !(any_active && sound_allowed) {
            return None;
        }
        Some(self.cue(at))
    }

    /// Unconditional cue, used by the "test alarm" button.
    pub fn cue(&mut self, at: DateTime<Local>) -> AudioCue {
        // ---
        self.emitted += 1;
        let nonce = format!("{}-{}", at.timestamp_millis(), self.emitted);
        AudioCue {
            src: format!("{}?n={}", BEEP_PATH, nonce),
            nonce,
        }
    }
}

fn synthesize_beep() -> Vec<u8> {
    // ---
    let samples = SAMPLE_RATE * TONE_MILLIS / 1000;
    let mut wav = Vec::with_capacity(44 + samples as usize);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + samples).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes()); // byte rate
    wav.extend_from_slice(&1u16.to_le_bytes()); // block align
    wav.extend_from_slice(&8u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&samples.to_le_bytes());

    for i in 0..samples {
        let t = f64::from(i) / f64::from(SAMPLE_RATE);
        let s = (2.0 * std::f64::consts::PI * TONE_HZ * t).sin();
        wav.push((128.0 + 100.0 * s).round() as u8);
    }

    wav
}
