use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::media::{EncodeError, ImagePreview};

/// What the user submitted. Shared behind an `Arc` once submitted so the
/// session can keep it while the request is in flight.
#[derive(Debug, Default)]
pub struct UserInput {
    pub text: String,
    pub image: Option<ImagePreview>,
    pub video_link: String,
}

impl UserInput {
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty()
            || self.image.is_some()
            || !self.video_link.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConcept {
    pub principle: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionalAtmosphere {
    pub keywords: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub headline: String,
    pub subheadline: String,
    pub core_concept: CoreConcept,
    pub emotional_atmosphere: EmotionalAtmosphere,
    pub structural_analysis: Vec<String>,
    pub metaphor: String,
    pub narrative_arc: String,
    pub scenarios: Vec<Scenario>,
    pub counter_perspective: String,
    pub visual_suggestions: Vec<String>,
    #[serde(default)]
    pub input_translation: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Gemini returned no response text")]
    EmptyResponse,
    #[error("Gemini response did not match the analysis schema: {0}")]
    MalformedResponse(String),
    #[error("Gemini request failed: {0}")]
    TransportFailure(String),
    #[error("Failed to read the attached image: {0}")]
    ImageRead(#[from] EncodeError),
}

pub const KEYWORD_RANGE: (usize, usize) = (3, 5);
pub const STRUCTURAL_POINTS: usize = 3;
pub const SCENARIO_COUNT: usize = 2;
pub const VISUAL_SUGGESTIONS: usize = 3;

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

impl AnalysisResult {
    /// Rejects results that deserialize but cannot be rendered.
    pub fn validate(&self) -> Result<(), String> {
        if is_blank(&self.headline) {
            return Err("headline is empty".to_string());
        }
        if is_blank(&self.subheadline) {
            return Err("subheadline is empty".to_string());
        }
        if self.emotional_atmosphere.keywords.is_empty() {
            return Err("emotional_atmosphere.keywords is empty".to_string());
        }
        if self.structural_analysis.is_empty() {
            return Err("structural_analysis is empty".to_string());
        }
        if self.scenarios.is_empty() {
            return Err("scenarios is empty".to_string());
        }
        if self.visual_suggestions.is_empty() {
            return Err("visual_suggestions is empty".to_string());
        }
        Ok(())
    }

    /// Count deviations the model is asked to avoid but that still render fine.
    pub fn shape_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let keywords = self.emotional_atmosphere.keywords.len();
        if keywords < KEYWORD_RANGE.0 || keywords > KEYWORD_RANGE.1 {
            warnings.push(format!(
                "expected {}-{} keywords, got {}",
                KEYWORD_RANGE.0, KEYWORD_RANGE.1, keywords
            ));
        }
        if self.structural_analysis.len() != STRUCTURAL_POINTS {
            warnings.push(format!(
                "expected {} structural points, got {}",
                STRUCTURAL_POINTS,
                self.structural_analysis.len()
            ));
        }
        if self.scenarios.len() != SCENARIO_COUNT {
            warnings.push(format!(
                "expected {} scenarios, got {}",
                SCENARIO_COUNT,
                self.scenarios.len()
            ));
        }
        if self.visual_suggestions.len() != VISUAL_SUGGESTIONS {
            warnings.push(format!(
                "expected {} visual suggestions, got {}",
                VISUAL_SUGGESTIONS,
                self.visual_suggestions.len()
            ));
        }
        warnings
    }

    /// The model decides whether a translation is needed; only a blank one
    /// is treated as absent.
    pub fn normalize_translation(&mut self) {
        if self.input_translation.as_deref().is_some_and(is_blank) {
            self.input_translation = None;
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Turns the raw response text into a validated result.
pub fn parse_analysis_result(raw: Option<&str>) -> Result<AnalysisResult, AnalysisError> {
    let text = raw.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }

    let mut result: AnalysisResult = serde_json::from_str(strip_code_fence(text))
        .map_err(|err| AnalysisError::MalformedResponse(err.to_string()))?;
    result
        .validate()
        .map_err(AnalysisError::MalformedResponse)?;

    for warning in result.shape_warnings() {
        warn!("Analysis result shape deviation: {}", warning);
    }
    result.normalize_translation();
    Ok(result)
}
