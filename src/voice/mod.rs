//! Voice processing module
//!
//! Handles audio capture, wake word detection, STT, TTS and playback.

mod capture;
mod devices;
mod listener;
mod playback;
mod speaker;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav, select_input_device};
pub use devices::{DeviceList, list_devices};
pub use listener::SpeechListener;
pub use playback::{
    AudioPlayback, DecodedAudio, decode_mp3, decode_wav, decode_wav_file, resample,
    select_output_device,
};
pub use speaker::VoiceSpeaker;
pub use stt::SpeechToText;
pub use tts::{TextToSpeech, build_ssml};
pub use wake_word::{DetectorState, KeywordOutcome, WakeWordDetector, calculate_energy};
