use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::analysis::{AnalysisError, AnalysisResult, UserInput};
use crate::config::ANALYSIS_FAILED_MESSAGE;
use crate::llm::gemini::{Analyzer, GenerativeService};
use crate::llm::media::{encode_image, BlobReader};
use crate::utils::language::detect_language_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Analyzing,
    Result,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "IDLE",
            Phase::Analyzing => "ANALYZING",
            Phase::Result => "RESULT",
            Phase::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {event} while {from}")]
    Invalid { from: Phase, event: &'static str },
    #[error("nothing to analyze")]
    EmptyInput,
}

/// Idle -> Analyzing -> (Result | Error) -> Idle. Rejected transitions leave
/// the machine untouched.
#[derive(Debug, Default)]
pub struct SessionMachine {
    phase: Phase,
    input: Option<Arc<UserInput>>,
    result: Option<AnalysisResult>,
    error: Option<String>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn input(&self) -> Option<&Arc<UserInput>> {
        self.input.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Analyzing
    }

    fn require(&self, expected: &[Phase], event: &'static str) -> Result<(), TransitionError> {
        if expected.contains(&self.phase) {
            Ok(())
        } else {
            Err(TransitionError::Invalid {
                from: self.phase,
                event,
            })
        }
    }

    pub fn submit(&mut self, input: UserInput) -> Result<Arc<UserInput>, TransitionError> {
        self.require(&[Phase::Idle], "submit")?;
        if !input.has_content() {
            return Err(TransitionError::EmptyInput);
        }
        let input = Arc::new(input);
        self.input = Some(input.clone());
        self.result = None;
        self.error = None;
        self.phase = Phase::Analyzing;
        Ok(input)
    }

    pub fn succeed(&mut self, result: AnalysisResult) -> Result<(), TransitionError> {
        self.require(&[Phase::Analyzing], "succeed")?;
        self.result = Some(result);
        self.phase = Phase::Result;
        Ok(())
    }

    /// The cause goes to the log only; the user sees a fixed message.
    pub fn fail(&mut self, cause: &AnalysisError) -> Result<(), TransitionError> {
        self.require(&[Phase::Analyzing], "fail")?;
        error!("Analysis failed: {}", cause);
        self.error = Some(ANALYSIS_FAILED_MESSAGE.to_string());
        self.phase = Phase::Error;
        Ok(())
    }

    pub fn resolve(
        &mut self,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> Result<Phase, TransitionError> {
        match outcome {
            Ok(result) => self.succeed(result)?,
            Err(err) => self.fail(&err)?,
        }
        Ok(self.phase)
    }

    pub fn reset(&mut self) -> Result<(), TransitionError> {
        self.require(&[Phase::Result, Phase::Error], "reset")?;
        self.input = None;
        self.result = None;
        self.error = None;
        self.phase = Phase::Idle;
        Ok(())
    }
}

/// Encodes the image (if any) and runs the analysis, in that order.
pub async fn run_analysis<S, R>(
    analyzer: &Analyzer<S>,
    reader: &R,
    input: &UserInput,
) -> Result<AnalysisResult, AnalysisError>
where
    S: GenerativeService,
    R: BlobReader,
{
    debug!(
        "Starting analysis (language={:?}, image={}, video_link={})",
        detect_language_name(&input.text),
        input.image.is_some(),
        !input.video_link.trim().is_empty()
    );

    let encoded = match &input.image {
        Some(preview) => Some(encode_image(reader, preview.blob()).await?),
        None => None,
    };

    let result = analyzer
        .analyze(&input.text, encoded.as_ref(), &input.video_link)
        .await?;
    info!("Analysis finished: {}", result.headline);
    Ok(result)
}
