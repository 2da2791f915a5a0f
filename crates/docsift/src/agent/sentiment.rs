use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::decode::from_value;
use super::llm::{ChatRequest, PromptRunner};
use super::{check_unit_interval, elapsed_secs, AnalysisAgent, AnalysisPayload};
use crate::config::schema::SENTIMENT_ANALYZER;
use crate::error::TaskError;

const INSTRUCTIONS: &str = "You are a sentiment and tone analyst. Provide nuanced emotional \
analysis for the document.";

const MAX_KEY_PHRASES: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tone {
    pub formality: String,
    pub urgency: String,
    pub objectivity: String,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            formality: "neutral".to_string(),
            urgency: "neutral".to_string(),
            objectivity: "balanced".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyPhrase {
    pub text: String,
    pub sentiment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentResult {
    pub overall: Sentiment,
    pub confidence: f64,
    pub tone: Tone,
    pub emotional_indicators: BTreeMap<String, f64>,
    pub key_phrases: Vec<KeyPhrase>,
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SentimentResult {
    /// The answer for a document with no text.
    pub fn neutral(note: &str, processing_time: f64) -> Self {
        Self {
            overall: Sentiment::Neutral,
            confidence: 0.0,
            tone: Tone::default(),
            emotional_indicators: BTreeMap::new(),
            key_phrases: Vec::new(),
            processing_time,
            note: Some(note.to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        check_unit_interval("confidence", self.confidence)?;
        for (emotion, score) in &self.emotional_indicators {
            check_unit_interval(emotion, *score)?;
        }
        if self.key_phrases.len() > MAX_KEY_PHRASES {
            return Err(TaskError::MalformedOutput(format!(
                "at most {} key phrases allowed, got {}",
                MAX_KEY_PHRASES,
                self.key_phrases.len()
            )));
        }
        Ok(())
    }
}

// ─── Reply shape ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToneReply {
    #[serde(default)]
    formality: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    objectivity: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyPhraseReply {
    text: String,
    #[serde(default)]
    sentiment: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SentimentReply {
    overall: String,
    confidence: f64,
    tone: ToneReply,
    #[serde(default)]
    emotional_indicators: BTreeMap<String, f64>,
    #[serde(default)]
    key_phrases: Vec<KeyPhraseReply>,
}

// ─── Normalization ──────────────────────────────────────────────────────────

fn or_default(value: String, default: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed.to_string()
    }
}

impl SentimentReply {
    pub(crate) fn into_result(self, processing_time: f64) -> Result<SentimentResult, TaskError> {
        let overall = Sentiment::parse(&self.overall).ok_or_else(|| {
            TaskError::MalformedOutput(format!(
                "overall sentiment must be one of: positive, neutral, negative (got {:?})",
                self.overall
            ))
        })?;

        let defaults = Tone::default();
        let tone = Tone {
            formality: or_default(self.tone.formality, defaults.formality),
            urgency: or_default(self.tone.urgency, defaults.urgency),
            objectivity: or_default(self.tone.objectivity, defaults.objectivity),
        };

        let emotional_indicators = self
            .emotional_indicators
            .into_iter()
            .filter(|(key, _)| !key.trim().is_empty())
            .map(|(key, score)| (key.trim().to_lowercase(), score.clamp(0.0, 1.0)))
            .collect();

        let key_phrases = self
            .key_phrases
            .into_iter()
            .filter(|phrase| !phrase.text.trim().is_empty())
            .take(MAX_KEY_PHRASES)
            .map(|phrase| KeyPhrase {
                text: phrase.text.trim().to_string(),
                sentiment: or_default(phrase.sentiment, "neutral".to_string()).to_lowercase(),
            })
            .collect();

        Ok(SentimentResult {
            overall,
            confidence: self.confidence,
            tone,
            emotional_indicators,
            key_phrases,
            processing_time,
            note: None,
        })
    }
}

// ─── Agent ──────────────────────────────────────────────────────────────────

pub struct SentimentAnalyzerAgent {
    runner: PromptRunner,
}

impl SentimentAnalyzerAgent {
    pub fn new(runner: PromptRunner) -> Self {
        Self { runner }
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new(
            INSTRUCTIONS,
            format!(
                "Document to analyze:\n\"\"\"{}\"\"\"\n\n\
                 1. Overall sentiment label (positive, negative, neutral).\n\
                 2. Confidence score between 0 and 1.\n\
                 3. Tone: formality, urgency, objectivity.\n\
                 4. Emotional indicators with scores from 0 to 1.\n\
                 5. 3-5 key phrases with their sentiment labels.\n\
                 Respond only with JSON of this exact shape: \
                 {{\"overall\": \"positive\", \"confidence\": 0.8, \
                 \"tone\": {{\"formality\", \"urgency\", \"objectivity\"}}, \
                 \"emotional_indicators\": {{\"<emotion>\": 0.5}}, \
                 \"key_phrases\": [{{\"text\", \"sentiment\"}}]}}.",
                text
            ),
        )
    }
}

#[async_trait]
impl AnalysisAgent for SentimentAnalyzerAgent {
    fn name(&self) -> &str {
        SENTIMENT_ANALYZER
    }

    async fn process(&self, text: &str) -> Result<AnalysisPayload, TaskError> {
        let start = Instant::now();
        if text.trim().is_empty() {
            return Ok(AnalysisPayload::Sentiment(SentimentResult::neutral(
                "Document text empty; defaulting to neutral sentiment.",
                elapsed_secs(start),
            )));
        }

        let value = self
            .runner
            .run_json(SENTIMENT_ANALYZER, Self::request(text))
            .await?;
        let reply: SentimentReply = from_value(value)?;

        let result = reply.into_result(elapsed_secs(start))?;
        result.validate()?;
        Ok(AnalysisPayload::Sentiment(result))
    }
}
