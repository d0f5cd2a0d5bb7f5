//! TOML configuration file loading
//!
//! Supports `~/.config/xiaodou/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct XiaodouConfigFile {
    /// Chat completion backend
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech service (STT and TTS)
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Audio devices
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Wake word and chimes
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Conversation history window
    #[serde(default)]
    pub history: HistoryFileConfig,

    /// Phrase spoken when the chat backend fails
    pub fallback_phrase: Option<String>,
}

/// Chat backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// "azure" or "openai"
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    /// Azure deployment name, or model name for `OpenAI`
    pub deployment: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Speech service configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// "azure" or "openai"
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub region: Option<String>,
    /// Recognition and synthesis language (e.g. "zh-CN")
    pub language: Option<String>,
    /// Synthesis voice (e.g. "zh-CN-XiaochenNeural")
    pub voice: Option<String>,
}

/// Audio device names
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    pub word: Option<String>,
    pub timeout_secs: Option<u64>,
    pub sound_start: Option<String>,
    pub sound_end: Option<String>,
}

/// History window configuration
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    pub max_len: Option<usize>,
    pub max_words: Option<usize>,
    pub system_prompt_file: Option<String>,
    pub autoload: Option<bool>,
}

/// Load the TOML config file
///
/// Uses `explicit` when given, otherwise the standard path. Returns
/// `XiaodouConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(explicit: Option<&Path>) -> XiaodouConfigFile {
    let Some(path) = explicit.map(Path::to_path_buf).or_else(config_file_path) else {
        return XiaodouConfigFile::default();
    };

    if !path.exists() {
        if explicit.is_some() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
        return XiaodouConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                XiaodouConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            XiaodouConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config(content: &str) -> crate::Result<XiaodouConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/xiaodou/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("xiaodou").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let fc = parse_config(
            r#"
            fallback_phrase = "sorry"

            [chat]
            provider = "openai"
            max_tokens = 200

            [history]
            max_len = 10
            autoload = false
            "#,
        )
        .unwrap();

        assert_eq!(fc.chat.provider.as_deref(), Some("openai"));
        assert_eq!(fc.chat.max_tokens, Some(200));
        assert_eq!(fc.history.max_len, Some(10));
        assert_eq!(fc.history.autoload, Some(false));
        assert!(fc.speech.region.is_none());
        assert_eq!(fc.fallback_phrase.as_deref(), Some("sorry"));
    }

    #[test]
    fn test_parse_invalid_file() {
        assert!(parse_config("[history]\nmax_len = \"many\"").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file(Some(&dir.path().join("nope.toml")));
        assert!(fc.chat.endpoint.is_none());
    }
}
