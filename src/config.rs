use std::env;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub log_level: String,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub gemini_temperature: f32,
    pub gemini_safety_settings: String,
    pub gemini_request_timeout_seconds: u64,
    pub telegram_max_length: usize,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "permissive".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to permissive.",
                value
            );
            "permissive".to_string()
        }
    }
}

fn normalize_api_base(value: String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_GEMINI_API_BASE.to_string();
    }
    trimmed.to_string()
}

fn clamp_temperature(value: f32) -> f32 {
    if !value.is_finite() {
        return DEFAULT_GEMINI_TEMPERATURE;
    }
    value.clamp(0.0, 2.0)
}

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_TEMPERATURE: f32 = 0.7;

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            bot_token: env_string("BOT_TOKEN", "").trim().to_string(),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_api_base: normalize_api_base(env_string(
                "GEMINI_API_BASE",
                DEFAULT_GEMINI_API_BASE,
            )),
            gemini_model: env_string("GEMINI_MODEL", "gemini-2.5-flash"),
            gemini_temperature: clamp_temperature(env_f32(
                "GEMINI_TEMPERATURE",
                DEFAULT_GEMINI_TEMPERATURE,
            )),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "permissive",
            )),
            gemini_request_timeout_seconds: env_u64("GEMINI_REQUEST_TIMEOUT_SECONDS", 90).max(1),
            telegram_max_length: env_usize("TELEGRAM_MAX_LENGTH", 4096).clamp(512, 4096),
        })
    }
}

/// Shown to the user whenever an analysis fails, regardless of the cause.
pub const ANALYSIS_FAILED_MESSAGE: &str = "分析内容失败。请检查您的输入和 API Key。";

/// Every narrative field of a result is written in this language.
pub const OUTPUT_LANGUAGE: &str = "Simplified Chinese (简体中文)";

pub const DECODE_PROMPT_TEMPLATE: &str = r#"You are a Master UX Designer and Philosopher.
Your task is to deeply interpret the user's input (Text, Image, or Video Context) using First Principles Thinking.

Input Text: "{input_text}"
Input Video Context: "{video_link}"

Analyze this content to uncover:
1. The hidden structure and core concept.
2. The emotion and atmosphere.
3. A strong metaphor.
4. A narrative arc.
5. Potential creative scenarios.

CRITICAL INSTRUCTION:
The output MUST be in {output_language}.
Even if the input is in English or any other language, you MUST interpret and output the result in {output_language}.

TRANSLATION INSTRUCTION:
Check if the "Input Text" is in Simplified Chinese.
If it is NOT (e.g., English, Japanese, etc.), provide a high-quality translation in the 'input_translation' field following the principle of 'Xin Da Ya' (Faithfulness, Expressiveness, and Elegance).
If the input is already Simplified Chinese, set 'input_translation' to null.

Output ONLY valid JSON matching the schema provided.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_safety_profile_falls_back_to_permissive() {
        assert_eq!(
            normalize_gemini_safety_settings("strictest".to_string()),
            "permissive"
        );
        assert_eq!(
            normalize_gemini_safety_settings(" Standard ".to_string()),
            "standard"
        );
    }

    #[test]
    fn api_base_drops_trailing_slash() {
        assert_eq!(
            normalize_api_base("http://localhost:8080/v1beta/".to_string()),
            "http://localhost:8080/v1beta"
        );
        assert_eq!(normalize_api_base("  ".to_string()), DEFAULT_GEMINI_API_BASE);
    }

    #[test]
    fn temperature_is_clamped() {
        assert_eq!(clamp_temperature(5.0), 2.0);
        assert_eq!(clamp_temperature(f32::NAN), DEFAULT_GEMINI_TEMPERATURE);
        assert_eq!(clamp_temperature(0.7), 0.7);
    }
}
