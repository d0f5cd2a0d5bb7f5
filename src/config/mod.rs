//! Configuration management for Xiaodou
//!
//! Built once at startup with precedence env > TOML file > default, then
//! passed by reference to whatever needs it.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::assistant::DEFAULT_FALLBACK_PHRASE;
use crate::history::{DEFAULT_MAX_LEN, DEFAULT_MAX_WORDS, HistoryConfig};
use crate::{Error, Result};

/// Default Azure `OpenAI` API version
pub const DEFAULT_API_VERSION: &str = "2023-03-15-preview";

/// Default wake word
pub const DEFAULT_WAKE_WORD: &str = "小豆";

const DEFAULT_SYSTEM_PROMPT: &str = "prompts/system.txt";
const DEFAULT_SOUND_START: &str = "sounds/sound_start.wav";
const DEFAULT_SOUND_END: &str = "sounds/sound_end.wav";

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat completion backend
    pub chat: ChatConfig,

    /// Speech recognition and synthesis
    pub speech: SpeechConfig,

    /// Audio device selection
    pub audio: AudioConfig,

    /// Wake word and chimes
    pub wake: WakeConfig,

    /// Conversation history window
    pub history: HistoryConfig,

    /// Phrase spoken when the chat backend fails
    pub fallback_phrase: String,
}

/// Chat backend flavor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatProvider {
    /// Azure `OpenAI` deployment
    #[default]
    Azure,
    /// `OpenAI`-compatible endpoint
    OpenAI,
}

impl ChatProvider {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!("unknown chat provider: {other}"))),
        }
    }
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub provider: ChatProvider,

    /// Endpoint base URL
    pub endpoint: Option<String>,

    pub api_key: Option<SecretString>,

    /// Azure API version query parameter
    pub api_version: String,

    /// Azure deployment name, or model name for `OpenAI`
    pub deployment: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum reply length in tokens
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ChatProvider::default(),
            endpoint: None,
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            deployment: None,
            temperature: 0.7,
            max_tokens: 75,
        }
    }
}

/// Speech service flavor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeechProvider {
    /// Azure Speech REST endpoints
    #[default]
    Azure,
    /// `OpenAI` Whisper and TTS
    OpenAI,
}

impl SpeechProvider {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!("unknown speech provider: {other}"))),
        }
    }

    /// Synthesis voice used when none is configured
    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::Azure => "zh-CN-XiaochenNeural",
            Self::OpenAI => "alloy",
        }
    }
}

/// Speech recognition and synthesis configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub provider: SpeechProvider,

    pub api_key: Option<SecretString>,

    /// Azure region (e.g. "eastasia")
    pub region: Option<String>,

    /// Recognition and synthesis language
    pub language: String,

    /// Synthesis voice
    pub voice: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::default(),
            api_key: None,
            region: None,
            language: "zh-CN".to_string(),
            voice: SpeechProvider::default().default_voice().to_string(),
        }
    }
}

/// Audio devices; `None` means the system default
#[derive(Debug, Clone, Default)]
pub struct AudioConfig {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

/// Wake word configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Phrase that starts a turn
    pub word: String,

    /// Give up waiting for the wake word after this long
    pub timeout: Option<Duration>,

    /// Chime played when the wake word is heard
    pub sound_start: PathBuf,

    /// Chime played when utterance capture ends
    pub sound_end: PathBuf,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            word: DEFAULT_WAKE_WORD.to_string(),
            timeout: None,
            sound_start: PathBuf::from(DEFAULT_SOUND_START),
            sound_end: PathBuf::from(DEFAULT_SOUND_END),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path);
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::build(fc, |key| std::env::var(key).ok(), exe_dir.as_deref())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// Default prompt and chime paths stay relative to the working directory.
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn from_sources<F>(fc: file::XiaodouConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(fc, env, None)
    }

    fn build<F>(fc: file::XiaodouConfigFile, env: F, asset_dir: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chat_defaults = ChatConfig::default();
        let chat = ChatConfig {
            provider: env("XIAODOU_CHAT_PROVIDER")
                .or(fc.chat.provider)
                .map(|p| ChatProvider::parse(&p))
                .transpose()?
                .unwrap_or_default(),
            endpoint: env("OPENAI_API_BASE").or(fc.chat.endpoint),
            api_key: env("OPENAI_API_KEY")
                .or(fc.chat.api_key)
                .map(SecretString::from),
            api_version: env("OPENAI_API_VERSION")
                .or(fc.chat.api_version)
                .unwrap_or(chat_defaults.api_version),
            deployment: env("AZURE_OPENAI_DEPLOYMENT_NAME").or(fc.chat.deployment),
            temperature: fc.chat.temperature.unwrap_or(chat_defaults.temperature),
            max_tokens: fc.chat.max_tokens.unwrap_or(chat_defaults.max_tokens),
        };

        let speech_defaults = SpeechConfig::default();
        let speech_provider: SpeechProvider = env("XIAODOU_SPEECH_PROVIDER")
            .or(fc.speech.provider)
            .map(|p| SpeechProvider::parse(&p))
            .transpose()?
            .unwrap_or_default();
        let speech = SpeechConfig {
            provider: speech_provider,
            api_key: env("SPEECH_API_KEY")
                .or(fc.speech.api_key)
                .map(SecretString::from),
            region: env("SPEECH_SERVICE_REGION").or(fc.speech.region),
            language: env("XIAODOU_SPEECH_LANGUAGE")
                .or(fc.speech.language)
                .unwrap_or(speech_defaults.language),
            voice: env("XIAODOU_SPEECH_VOICE")
                .or(fc.speech.voice)
                .unwrap_or_else(|| speech_provider.default_voice().to_string()),
        };

        let audio = AudioConfig {
            input_device: env("XIAODOU_INPUT_DEVICE")
                .or(fc.audio.input_device)
                .filter(|d| !d.is_empty()),
            output_device: env("XIAODOU_OUTPUT_DEVICE")
                .or(fc.audio.output_device)
                .filter(|d| !d.is_empty()),
        };

        let wake_defaults = WakeConfig::default();
        let wake = WakeConfig {
            word: env("XIAODOU_WAKE_WORD")
                .or(fc.wake.word)
                .unwrap_or(wake_defaults.word),
            timeout: env("XIAODOU_WAKE_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .or(fc.wake.timeout_secs)
                .map(Duration::from_secs),
            sound_start: fc
                .wake
                .sound_start
                .map_or_else(|| asset_path(asset_dir, DEFAULT_SOUND_START), PathBuf::from),
            sound_end: fc
                .wake
                .sound_end
                .map_or_else(|| asset_path(asset_dir, DEFAULT_SOUND_END), PathBuf::from),
        };

        let history = HistoryConfig {
            max_len: fc.history.max_len.unwrap_or(DEFAULT_MAX_LEN),
            max_words: fc.history.max_words.unwrap_or(DEFAULT_MAX_WORDS),
            system_prompt_file: Some(
                env("XIAODOU_SYSTEM_PROMPT")
                    .or(fc.history.system_prompt_file)
                    .map_or_else(|| asset_path(asset_dir, DEFAULT_SYSTEM_PROMPT), PathBuf::from),
            ),
            autoload: fc.history.autoload.unwrap_or(true),
        };

        Ok(Self {
            chat,
            speech,
            audio,
            wake,
            history,
            fallback_phrase: fc
                .fallback_phrase
                .unwrap_or_else(|| DEFAULT_FALLBACK_PHRASE.to_string()),
        })
    }
}

/// Resolve a bundled asset next to the executable, else the working directory
fn asset_path(asset_dir: Option<&Path>, relative: &str) -> PathBuf {
    asset_dir
        .map(|dir| dir.join(relative))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(relative))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(file::XiaodouConfigFile::default(), env_of(&[])).unwrap();

        assert_eq!(config.chat.provider, ChatProvider::Azure);
        assert_eq!(config.chat.api_version, DEFAULT_API_VERSION);
        assert!((config.chat.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.chat.max_tokens, 75);
        assert_eq!(config.speech.language, "zh-CN");
        assert_eq!(config.wake.word, DEFAULT_WAKE_WORD);
        assert!(config.wake.timeout.is_none());
        assert!(config.audio.input_device.is_none());
        assert_eq!(config.history.max_len, 30);
        assert_eq!(config.history.max_words, 3000);
        assert!(config.history.autoload);
        assert_eq!(config.fallback_phrase, DEFAULT_FALLBACK_PHRASE);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = file::parse_config(
            r#"
            [chat]
            endpoint = "https://from-file"
            deployment = "file-deployment"

            [audio]
            output_device = "Speakers"
            "#,
        )
        .unwrap();
        let env = env_of(&[
            ("OPENAI_API_BASE", "https://from-env"),
            ("OPENAI_API_KEY", "sk-test"),
            ("XIAODOU_WAKE_TIMEOUT", "30"),
        ]);

        let config = Config::from_sources(fc, env).unwrap();

        assert_eq!(config.chat.endpoint.as_deref(), Some("https://from-env"));
        assert_eq!(config.chat.deployment.as_deref(), Some("file-deployment"));
        assert_eq!(
            config.chat.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("sk-test".to_string())
        );
        assert_eq!(config.audio.output_device.as_deref(), Some("Speakers"));
        assert_eq!(config.wake.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_empty_device_name_means_default() {
        let env = env_of(&[("XIAODOU_INPUT_DEVICE", "")]);
        let config = Config::from_sources(file::XiaodouConfigFile::default(), env).unwrap();
        assert!(config.audio.input_device.is_none());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let env = env_of(&[("XIAODOU_CHAT_PROVIDER", "bard")]);
        let result = Config::from_sources(file::XiaodouConfigFile::default(), env);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_secrets_hidden_from_debug() {
        let env = env_of(&[("SPEECH_API_KEY", "super-secret-key")]);
        let config = Config::from_sources(file::XiaodouConfigFile::default(), env).unwrap();
        assert!(!format!("{config:?}").contains("super-secret-key"));
    }

    #[test]
    fn test_voice_default_follows_provider() {
        let env = env_of(&[("XIAODOU_SPEECH_PROVIDER", "openai")]);
        let config = Config::from_sources(file::XiaodouConfigFile::default(), env).unwrap();
        assert_eq!(config.speech.voice, "alloy");

        let config = Config::from_sources(file::XiaodouConfigFile::default(), env_of(&[])).unwrap();
        assert_eq!(config.speech.voice, "zh-CN-XiaochenNeural");

        let env = env_of(&[
            ("XIAODOU_SPEECH_PROVIDER", "openai"),
            ("XIAODOU_SPEECH_VOICE", "nova"),
        ]);
        let config = Config::from_sources(file::XiaodouConfigFile::default(), env).unwrap();
        assert_eq!(config.speech.voice, "nova");
    }

    #[test]
    fn test_assets_resolve_next_to_executable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join(DEFAULT_SYSTEM_PROMPT), "你是小豆").unwrap();

        let config =
            Config::build(file::XiaodouConfigFile::default(), env_of(&[]), Some(dir.path())).unwrap();

        assert_eq!(
            config.history.system_prompt_file.as_deref(),
            Some(dir.path().join(DEFAULT_SYSTEM_PROMPT).as_path())
        );
        // Missing next to the executable, so left relative
        assert_eq!(config.wake.sound_start, PathBuf::from(DEFAULT_SOUND_START));
    }

    #[test]
    fn test_explicit_prompt_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_of(&[("XIAODOU_SYSTEM_PROMPT", "/etc/xiaodou/prompt.txt")]);

        let config = Config::build(file::XiaodouConfigFile::default(), env, Some(dir.path())).unwrap();

        assert_eq!(
            config.history.system_prompt_file.as_deref(),
            Some(Path::new("/etc/xiaodou/prompt.txt"))
        );
    }
}
