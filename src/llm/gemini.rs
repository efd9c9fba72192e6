use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::analysis::{parse_analysis_result, AnalysisError, AnalysisResult};
use crate::config::{CONFIG, DECODE_PROMPT_TEMPLATE, OUTPUT_LANGUAGE};
use crate::llm::media::EncodedImage;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

/// The remote model boundary: one payload in, the raw response text out.
pub trait GenerativeService {
    fn generate(
        &self,
        model: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<Option<String>, AnalysisError>> + Send;
}

#[derive(Debug, Clone)]
pub struct GeminiService {
    api_base: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiService {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            CONFIG.gemini_api_base.clone(),
            CONFIG.gemini_api_key.clone(),
            Duration::from_secs(CONFIG.gemini_request_timeout_seconds),
        )
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    async fn call(&self, model: &str, payload: &Value) -> Result<Option<String>, AnalysisError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = model, payload = %summarize_gemini_payload(payload));
        }

        let response = get_http_client()
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                AnalysisError::TransportFailure(err_text)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(AnalysisError::TransportFailure(format!(
                "status {}: {}",
                status,
                self.redact(&detail)
            )));
        }

        let value = response.json::<GeminiResponse>().await.map_err(|err| {
            AnalysisError::TransportFailure(format!(
                "unreadable response body: {}",
                self.redact(&err.to_string())
            ))
        })?;
        Ok(extract_text_from_response(value))
    }
}

impl GenerativeService for GeminiService {
    fn generate(
        &self,
        model: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<Option<String>, AnalysisError>> + Send {
        self.call(model, payload)
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let parts = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
        .map(|parts| {
            parts
                .iter()
                .map(|part| {
                    if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                        json!({ "text": truncate_for_log(text, 200) })
                    } else if let Some(inline_data) = part.get("inlineData") {
                        let mime_type = inline_data
                            .get("mimeType")
                            .and_then(|value| value.as_str())
                            .unwrap_or("unknown");
                        let data_len = inline_data
                            .get("data")
                            .and_then(|value| value.as_str())
                            .map(|value| value.len())
                            .unwrap_or(0);
                        json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                    } else {
                        json!({ "unknownPart": true })
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut summary = Map::new();
    summary.insert("parts".to_string(), Value::Array(parts));
    if let Some(temperature) = payload.pointer("/generationConfig/temperature") {
        summary.insert("temperature".to_string(), temperature.clone());
    }
    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }
    Value::Object(summary)
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn extract_text_from_response(response: GeminiResponse) -> Option<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        warn!("Gemini blocked the prompt: {}", reason);
    }

    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                warn!("Gemini candidate finished with reason {}", reason);
            }
        }
        let parts = candidate
            .content
            .and_then(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.text {
                if !text.trim().is_empty() {
                    text_parts.push(text);
                }
            }
        }
        if !text_parts.is_empty() {
            break;
        }
    }

    if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.concat())
    }
}

pub fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        _ => "OFF",
    };

    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
        "HARM_CATEGORY_CIVIC_INTEGRITY",
    ]
    .iter()
    .map(|category| json!({ "category": category, "threshold": threshold }))
    .collect()
}

fn string_field(description: &str) -> Value {
    json!({ "type": "STRING", "description": description })
}

fn string_list(description: &str) -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" }, "description": description })
}

/// Structured-output schema the model is constrained to.
pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "input_translation": {
                "type": "STRING",
                "nullable": true,
                "description": "If the input text is NOT in Simplified Chinese, provide a 'Xin Da Ya' (faithful, expressive, elegant) translation here. If it is already in Chinese, return null."
            },
            "headline": string_field("A very short, punchy, Takahashi-style headline in Simplified Chinese (max 6 chars)."),
            "subheadline": string_field("A one-sentence summary of the essence in Simplified Chinese."),
            "core_concept": {
                "type": "OBJECT",
                "properties": {
                    "principle": string_field("The first principle or underlying logic in Simplified Chinese."),
                    "explanation": string_field("Brief explanation of the principle in Simplified Chinese.")
                },
                "required": ["principle", "explanation"]
            },
            "emotional_atmosphere": {
                "type": "OBJECT",
                "properties": {
                    "keywords": string_list("3-5 emotive keywords in Simplified Chinese."),
                    "description": string_field("The mood and vibe analysis in Simplified Chinese.")
                },
                "required": ["keywords", "description"]
            },
            "structural_analysis": string_list("3 bullet points analyzing the structure or composition in Simplified Chinese."),
            "metaphor": string_field("A creative metaphor or analogy for the content in Simplified Chinese."),
            "narrative_arc": string_field("A short story or narrative interpretation in Simplified Chinese."),
            "scenarios": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": string_field("Scenario title in Simplified Chinese"),
                        "description": string_field("Scenario description in Simplified Chinese")
                    },
                    "required": ["title", "description"]
                },
                "description": "2 creative application scenarios or extension ideas in Simplified Chinese."
            },
            "counter_perspective": string_field("An inverse or devil's advocate viewpoint in Simplified Chinese."),
            "visual_suggestions": string_list("3 specific prompts or ideas for visuals/illustrations based on this content in Simplified Chinese.")
        },
        "required": [
            "headline",
            "subheadline",
            "core_concept",
            "emotional_atmosphere",
            "structural_analysis",
            "metaphor",
            "narrative_arc",
            "scenarios",
            "counter_perspective",
            "visual_suggestions"
        ]
    })
}

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(input_text|video_link|output_language)\}").expect("valid placeholder regex")
});

/// Fills the template in a single pass, so user text that looks like a
/// placeholder stays literal.
pub fn build_decode_prompt(text: &str, video_link: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(DECODE_PROMPT_TEMPLATE, |caps: &Captures| match &caps[1] {
            "input_text" => text.to_string(),
            "video_link" => video_link.to_string(),
            _ => OUTPUT_LANGUAGE.to_string(),
        })
        .into_owned()
}

pub fn build_analysis_payload(
    prompt: &str,
    image: Option<&EncodedImage>,
    temperature: f32,
    safety_profile: &str,
) -> Value {
    let mut parts = vec![json!({ "text": prompt })];
    if let Some(image) = image {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.mime_type,
                "data": image.data
            }
        }));
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": analysis_schema(),
            "temperature": temperature,
        },
        "safetySettings": build_safety_settings(safety_profile),
    })
}

/// Analysis client: prompt construction, the remote call and result parsing.
#[derive(Debug, Clone)]
pub struct Analyzer<S> {
    service: S,
    model: String,
    temperature: f32,
    safety_profile: String,
}

impl Analyzer<GeminiService> {
    pub fn from_config() -> Self {
        Self::new(
            GeminiService::from_config(),
            CONFIG.gemini_model.clone(),
            CONFIG.gemini_temperature,
            CONFIG.gemini_safety_settings.clone(),
        )
    }
}

impl<S: GenerativeService> Analyzer<S> {
    pub fn new(
        service: S,
        model: impl Into<String>,
        temperature: f32,
        safety_profile: impl Into<String>,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            temperature,
            safety_profile: safety_profile.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(
        &self,
        text: &str,
        image: Option<&EncodedImage>,
        video_link: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let prompt = build_decode_prompt(text, video_link);
        let payload =
            build_analysis_payload(&prompt, image, self.temperature, &self.safety_profile);
        let metadata = json!({
            "has_image": image.is_some(),
            "has_video_link": !video_link.trim().is_empty(),
            "text_chars": text.chars().count(),
        });

        log_llm_timing("gemini", &self.model, "decode", Some(metadata), || async {
            let raw = self.service.generate(&self.model, &payload).await?;
            parse_analysis_result(raw.as_deref())
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::analysis::tests::{sample_json, sample_result};

    /// Replays a canned outcome and records the payloads it was sent.
    #[derive(Clone)]
    pub(crate) struct ScriptedService {
        reply: Arc<dyn Fn() -> Result<Option<String>, AnalysisError> + Send + Sync>,
        pub(crate) calls: Arc<Mutex<Vec<Value>>>,
    }

    impl ScriptedService {
        pub(crate) fn replying(text: Option<&str>) -> Self {
            let text = text.map(str::to_string);
            Self {
                reply: Arc::new(move || Ok(text.clone())),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            let message = message.to_string();
            Self {
                reply: Arc::new(move || Err(AnalysisError::TransportFailure(message.clone()))),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl GenerativeService for ScriptedService {
        fn generate(
            &self,
            _model: &str,
            payload: &Value,
        ) -> impl Future<Output = Result<Option<String>, AnalysisError>> + Send {
            self.calls.lock().push(payload.clone());
            let outcome = (self.reply)();
            async move { outcome }
        }
    }

    pub(crate) fn analyzer(service: ScriptedService) -> Analyzer<ScriptedService> {
        Analyzer::new(service, "gemini-2.5-flash", 0.7, "permissive")
    }

    #[tokio::test]
    async fn exact_schema_reply_is_returned_verbatim() {
        let service = ScriptedService::replying(Some(&sample_json().to_string()));
        let result = analyzer(service).analyze("minimalism", None, "").await.unwrap();
        assert_eq!(result, sample_result());
    }

    #[tokio::test]
    async fn missing_fields_fail_as_malformed() {
        let service = ScriptedService::replying(Some(r#"{"headline":"少即是多"}"#));
        let err = analyzer(service).analyze("minimalism", None, "").await.unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn empty_reply_fails_as_empty_response() {
        let err = analyzer(ScriptedService::replying(Some("")))
            .analyze("minimalism", None, "")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResponse));
    }

    #[tokio::test]
    async fn transport_failure_is_not_retried() {
        let service = ScriptedService::failing("connection reset");
        let calls = service.calls.clone();
        let err = analyzer(service).analyze("minimalism", None, "").await.unwrap_err();
        assert!(matches!(err, AnalysisError::TransportFailure(_)));
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn payload_carries_prompt_schema_and_image() {
        let service = ScriptedService::replying(Some(&sample_json().to_string()));
        let calls = service.calls.clone();
        let image = EncodedImage {
            mime_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
        };
        analyzer(service)
            .analyze("minimalism", Some(&image), "https://youtu.be/xyz")
            .await
            .unwrap();

        let payload = calls.lock()[0].clone();
        let prompt = payload.pointer("/contents/0/parts/0/text").unwrap().as_str().unwrap();
        assert!(prompt.contains("Input Text: \"minimalism\""));
        assert!(prompt.contains("Input Video Context: \"https://youtu.be/xyz\""));
        assert!(prompt.contains(OUTPUT_LANGUAGE));
        assert_eq!(
            payload.pointer("/contents/0/parts/1/inlineData/mimeType"),
            Some(&json!("image/png"))
        );
        assert_eq!(
            payload.pointer("/contents/0/parts/1/inlineData/data"),
            Some(&json!("iVBORw0KGgo="))
        );
        assert_eq!(
            payload.pointer("/generationConfig/responseMimeType"),
            Some(&json!("application/json"))
        );
        let required = payload
            .pointer("/generationConfig/responseSchema/required")
            .and_then(|value| value.as_array())
            .unwrap();
        assert_eq!(required.len(), 10);
        assert!(!required.contains(&json!("input_translation")));
        let temperature = payload
            .pointer("/generationConfig/temperature")
            .and_then(|value| value.as_f64())
            .unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn placeholder_lookalikes_in_input_stay_literal() {
        let prompt = build_decode_prompt("minimalism", "https://example.com/{input_text}");
        assert!(prompt.contains("Input Video Context: \"https://example.com/{input_text}\""));
        assert!(prompt.contains("Input Text: \"minimalism\""));

        let prompt = build_decode_prompt("{video_link} {output_language}", "");
        assert!(prompt.contains("Input Text: \"{video_link} {output_language}\""));
        assert!(!prompt.contains("{output_language}\n"));
    }

    #[tokio::test]
    async fn traditional_chinese_input_keeps_its_translation() {
        let mut reply = sample_json();
        reply["input_translation"] = json!("极简主义的力量在于克制与留白。");
        let service = ScriptedService::replying(Some(&reply.to_string()));
        let result = analyzer(service)
            .analyze("極簡主義的力量在於克制與留白，讓每一個元素都有呼吸的空間。", None, "")
            .await
            .unwrap();
        assert_eq!(
            result.input_translation.as_deref(),
            Some("极简主义的力量在于克制与留白。")
        );
    }

    #[tokio::test]
    async fn text_only_payload_has_single_part() {
        let service = ScriptedService::replying(Some(&sample_json().to_string()));
        let calls = service.calls.clone();
        analyzer(service).analyze("minimalism", None, "").await.unwrap();
        let payload = calls.lock()[0].clone();
        let parts = payload.pointer("/contents/0/parts").unwrap().as_array().unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn response_text_is_joined_from_first_candidate() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] }, "finishReason": "STOP" },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(extract_text_from_response(response).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn blocked_prompt_yields_no_text() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert_eq!(extract_text_from_response(response), None);
    }

    #[test]
    fn error_body_message_is_extracted() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":400,"message":"API key not valid."}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid."));
        assert_eq!(summarize_error_body("  ").1, "empty response body");
    }

    #[test]
    fn safety_profile_maps_to_threshold() {
        let standard = build_safety_settings("standard");
        assert_eq!(standard.len(), 5);
        assert_eq!(standard[0]["threshold"], json!("BLOCK_MEDIUM_AND_ABOVE"));
        assert_eq!(build_safety_settings("permissive")[0]["threshold"], json!("OFF"));
    }
}
