//! Rendering of the server's transcription and speech analysis.

use std::fmt::Write;

use crate::upload::{SpeechAnalysis, UploadResponse};

/// Composite score needed to pass a level.
pub const PASSING_SCORE: u32 = 60;

/// Composite level score the backend uses to decide level completion:
/// mean of repetition, flow and confidence, minus capped filler and weak-word penalties.
pub fn level_score(analysis: &SpeechAnalysis) -> u32 {
    let filler_penalty = (analysis.filler_count as f64 * 2.0).min(20.0);
    let weak_words_penalty = (analysis.weak_words_count as f64 * 3.0).min(15.0);

    let mean =
        (analysis.repetition_score + analysis.flow_score + analysis.confidence_score) / 3.0;
    (mean - filler_penalty - weak_words_penalty).max(0.0).round() as u32
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", title);
    for item in items {
        let _ = writeln!(out, "  - {}", item);
    }
}

/// Plain-text report for the terminal.
pub fn render_feedback(response: &UploadResponse) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Your speech ===");
    match response.transcription.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => {
            let _ = writeln!(out, "\"{}\"", text);
        }
        _ => {
            let _ = writeln!(out, "(no transcription returned)");
        }
    }

    let Some(analysis) = &response.analysis else {
        return out;
    };

    let score = level_score(analysis);
    let _ = writeln!(out);
    let _ = writeln!(out, "=== Analysis ===");
    let _ = writeln!(out, "Flow:        {:>5.0}/100", analysis.flow_score);
    let _ = writeln!(out, "Confidence:  {:>5.0}/100", analysis.confidence_score);
    let _ = writeln!(out, "Repetition:  {:>5.0}/100", analysis.repetition_score);
    let _ = writeln!(out, "Fillers:     {:>5}", analysis.filler_count);
    let _ = writeln!(
        out,
        "Level score: {:>5} ({})",
        score,
        if score >= PASSING_SCORE {
            "passed"
        } else {
            "keep practicing"
        }
    );

    let summary = &analysis.summary;
    if !summary.flow.is_empty() {
        let _ = writeln!(out, "\nFlow: {}", summary.flow);
    }
    if !summary.weakness.is_empty() {
        let _ = writeln!(out, "Weakness: {}", summary.weakness);
    }
    if !summary.growth_potential.is_empty() {
        let _ = writeln!(out, "Growth potential: {}", summary.growth_potential);
    }

    if let Some(detail) = analysis.detailed_feedback.as_deref() {
        if !detail.is_empty() {
            let _ = writeln!(out, "\n{}", detail);
        }
    }

    push_list(&mut out, "Strengths", &analysis.strengths);
    push_list(&mut out, "Work on", &analysis.improvement_areas);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::AnalysisSummary;

    fn analysis(flow: f64, confidence: f64, repetition: f64, fillers: u32, weak: u32) -> SpeechAnalysis {
        SpeechAnalysis {
            flow_score: flow,
            confidence_score: confidence,
            repetition_score: repetition,
            filler_count: fillers,
            weak_words_count: weak,
            ..Default::default()
        }
    }

    #[test]
    fn score_is_mean_without_penalties() {
        assert_eq!(level_score(&analysis(70.0, 70.0, 75.0, 0, 0)), 72);
    }

    #[test]
    fn filler_and_weak_word_penalties_are_capped() {
        // penalties: min(50*2, 20) + min(10*3, 15) = 35
        assert_eq!(level_score(&analysis(90.0, 90.0, 90.0, 50, 10)), 55);
        assert_eq!(level_score(&analysis(90.0, 90.0, 90.0, 3, 1)), 81);
    }

    #[test]
    fn score_never_negative() {
        assert_eq!(level_score(&analysis(10.0, 10.0, 10.0, 50, 50)), 0);
    }

    #[test]
    fn render_includes_transcription_and_summary() {
        let response = UploadResponse {
            success: true,
            transcription: Some("  hello everyone  ".to_string()),
            analysis: Some(SpeechAnalysis {
                summary: AnalysisSummary {
                    flow: "Clear structure".to_string(),
                    weakness: "Too many fillers".to_string(),
                    growth_potential: "Pause instead of um".to_string(),
                },
                strengths: vec!["Good pace".to_string()],
                ..analysis(80.0, 70.0, 90.0, 2, 0)
            }),
            ..Default::default()
        };
        let text = render_feedback(&response);
        assert!(text.contains("\"hello everyone\""));
        assert!(text.contains("Too many fillers"));
        assert!(text.contains("- Good pace"));
        assert!(text.contains("passed"));
    }

    #[test]
    fn render_without_analysis() {
        let text = render_feedback(&UploadResponse::default());
        assert!(text.contains("no transcription"));
        assert!(!text.contains("Analysis"));
    }
}
