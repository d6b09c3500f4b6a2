//! Payload and response types for the practice backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to an upload. Supplied by whoever picked the task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub level_number: Option<u32>,
    pub task_id: Option<u32>,
    pub is_quick_task: bool,
    pub task_prompt: Option<String>,
}

impl TaskContext {
    /// Context for a numbered level task.
    pub fn level(level_number: u32, task_id: Option<u32>, task_prompt: Option<String>) -> Self {
        Self {
            level_number: Some(level_number),
            task_id,
            is_quick_task: false,
            task_prompt,
        }
    }
}

/// Encoded WAV payload ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub sample_count: usize,
    pub created_at: DateTime<Utc>,
}

impl AudioBlob {
    pub const MIME_TYPE: &'static str = "audio/wav";

    pub fn new(bytes: Vec<u8>, sample_rate: u32, sample_count: usize) -> Self {
        Self {
            bytes,
            sample_rate,
            sample_count,
            created_at: Utc::now(),
        }
    }

    /// Format: recording_<unix millis>.wav
    pub fn file_name(&self) -> String {
        format!("recording_{}.wav", self.created_at.timestamp_millis())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoders for model-generated analysis fields. A `null`, a float where a
/// count belongs, or a number sent as a string degrades to a usable value
/// instead of failing the whole response.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number(value: Option<Value>) -> f64 {
        match value {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn score<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let n = number(Option::deserialize(d)?);
        Ok(if n.is_finite() { n } else { 0.0 })
    }

    /// Rounds to the nearest count; negative and NaN become 0.
    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(number(Option::deserialize(d)?).round() as u32)
    }

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }

    /// Keeps the string entries of a list; anything else is skipped.
    pub fn strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let items: Option<Vec<Value>> = Option::deserialize(d)?;
        Ok(items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSummary {
    #[serde(deserialize_with = "lenient::or_default")]
    pub flow: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub weakness: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub growth_potential: String,
}

/// Speech analysis returned alongside the transcription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechAnalysis {
    #[serde(deserialize_with = "lenient::score")]
    pub flow_score: f64,
    #[serde(deserialize_with = "lenient::score")]
    pub confidence_score: f64,
    #[serde(deserialize_with = "lenient::score")]
    pub repetition_score: f64,
    #[serde(deserialize_with = "lenient::count")]
    pub filler_count: u32,
    #[serde(deserialize_with = "lenient::count")]
    pub weak_words_count: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub summary: AnalysisSummary,
    pub detailed_feedback: Option<String>,
    #[serde(deserialize_with = "lenient::strings")]
    pub strengths: Vec<String>,
    #[serde(deserialize_with = "lenient::strings")]
    pub improvement_areas: Vec<String>,
}

/// Response body of `POST /api/upload-audio`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub analysis: Option<SpeechAnalysis>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub response_id: Option<u64>,
}

/// Response body of `GET /api/generate-quick-task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickTask {
    pub sentence_starter: String,
    #[serde(default)]
    pub example_completion: String,
    #[serde(default)]
    pub topic_hint: String,
}

impl QuickTask {
    pub fn to_task_context(&self) -> TaskContext {
        TaskContext {
            level_number: None,
            task_id: None,
            is_quick_task: true,
            task_prompt: Some(self.sentence_starter.clone()),
        }
    }
}
