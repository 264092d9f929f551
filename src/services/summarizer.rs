// ============================================================================
// SUMMARIZER - transcription → { keyPoints, fullSummary, tags }
// ============================================================================
//
// Flux:
//   1. Corps du prompt: une ligne "[timestamp] texte" par segment
//   2. Corps ≤ seuil (50 000 caractères par défaut) → un seul appel structuré
//   3. Corps > seuil → découpage:
//        - segments regroupés en morceaux contigus de moins de seuil/3
//          caractères (un segment n'est jamais coupé)
//        - un appel court par morceau, avec une pause entre deux appels
//        - les résumés partiels (séparés par une ligne vide) alimentent
//          l'appel final structuré
//   4. Validation stricte du JSON: tout écart est une erreur, jamais un
//      résultat partiel
//
// ============================================================================

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AiSettings;
use crate::models::dto::{TranscriptSegment, VideoMetadata};
use crate::services::ai_client::{AiError, ChatProvider, ChatRequest};

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize YouTube video transcripts. \
Answer with a JSON object only, using exactly these keys: \
\"keyPoints\" (array of 3 to 8 short strings), \
\"fullSummary\" (string, 150 to 300 words), \
\"tags\" (array of up to 5 lowercase topic strings).";

const CHUNK_SYSTEM_PROMPT: &str = "You summarize one part of a longer YouTube video transcript. \
Write a dense plain-text summary of this part in at most 150 words.";

const CHUNK_MAX_TOKENS: u32 = 500;
const SUMMARY_MAX_TOKENS: u32 = 2000;
const TEMPERATURE: f32 = 0.3;

/// Résultat validé renvoyé par le LLM
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSummary {
    pub key_points: Vec<String>,
    pub full_summary: String,
    pub tags: Vec<String>,
}

#[derive(Clone)]
pub struct Summarizer {
    provider: Arc<dyn ChatProvider>,
    chunk_threshold: usize,
    chunk_delay: Duration,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn ChatProvider>, settings: &AiSettings) -> Self {
        Self::with_limits(provider, settings.chunk_threshold, settings.chunk_delay)
    }

    pub fn with_limits(provider: Arc<dyn ChatProvider>, chunk_threshold: usize, chunk_delay: Duration) -> Self {
        Self {
            provider,
            chunk_threshold: chunk_threshold.max(3),
            chunk_delay,
        }
    }

    pub async fn summarize(
        &self,
        transcript: &[TranscriptSegment],
        video: &VideoMetadata,
    ) -> Result<GeneratedSummary, AiError> {
        let body = format_transcript(transcript);
        let body_len = body.chars().count();

        let (content, chunked) = if body_len > self.chunk_threshold {
            let partials = self.summarize_chunks(transcript, video).await?;
            (partials.join("\n\n"), true)
        } else {
            (body, false)
        };

        let raw = self
            .provider
            .chat_complete(ChatRequest {
                system: SUMMARY_SYSTEM_PROMPT.to_string(),
                user: build_summary_prompt(video, &content, chunked),
                max_tokens: SUMMARY_MAX_TOKENS,
                temperature: TEMPERATURE,
                json_output: true,
            })
            .await?;

        parse_summary(&raw)
    }

    async fn summarize_chunks(
        &self,
        transcript: &[TranscriptSegment],
        video: &VideoMetadata,
    ) -> Result<Vec<String>, AiError> {
        let chunks = chunk_segments(transcript, self.chunk_threshold / 3);
        let total = chunks.len();

        tracing::info!(
            video_id = %video.video_id,
            segments = transcript.len(),
            chunks = total,
            "Transcript above threshold, summarizing in chunks"
        );

        let mut partials = Vec::with_capacity(total);
        for (index, chunk) in chunks.into_iter().enumerate() {
            // Pause entre deux appels (limites de débit du fournisseur)
            if index > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }

            let partial = self
                .provider
                .chat_complete(ChatRequest {
                    system: CHUNK_SYSTEM_PROMPT.to_string(),
                    user: format!(
                        "Video: {}\nPart {} of {}\n\n{}",
                        video.title,
                        index + 1,
                        total,
                        format_transcript(chunk)
                    ),
                    max_tokens: CHUNK_MAX_TOKENS,
                    temperature: TEMPERATURE,
                    json_output: false,
                })
                .await?;

            let partial = partial.trim();
            if partial.is_empty() {
                return Err(AiError::EmptyResponse);
            }
            partials.push(partial.to_string());
        }

        Ok(partials)
    }
}

/// "[timestamp] texte" par segment, séparés par des retours à la ligne
pub fn format_transcript(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(format_segment)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_segment(segment: &TranscriptSegment) -> String {
    format!("[{}] {}", segment.timestamp, segment.text)
}

/// Texte aplati stocké en cache: textes des segments joints par un espace
pub fn flatten_transcript(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Découpage glouton en morceaux contigus dont la longueur formatée reste
/// sous max_len. Un segment plus long que max_len forme un morceau à lui seul.
pub fn chunk_segments(segments: &[TranscriptSegment], max_len: usize) -> Vec<&[TranscriptSegment]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut current_len = 0;

    for (index, segment) in segments.iter().enumerate() {
        let line_len = format_segment(segment).chars().count();
        // +1 pour le retour à la ligne qui précède chaque ligne sauf la première
        let added = if index == start { line_len } else { line_len + 1 };

        if index > start && current_len + added >= max_len {
            chunks.push(&segments[start..index]);
            start = index;
            current_len = line_len;
        } else {
            current_len += added;
        }
    }

    if start < segments.len() {
        chunks.push(&segments[start..]);
    }

    chunks
}

fn build_summary_prompt(video: &VideoMetadata, content: &str, chunked: bool) -> String {
    let source = if chunked {
        "Summaries of consecutive parts of the transcript"
    } else {
        "Transcript"
    };

    format!(
        "Video title: {}\nChannel: {}\n\n{}:\n{}",
        video.title, video.channel_name, source, content
    )
}

/// Valide la réponse structurée. Tolère un bloc ```json autour de l'objet.
pub fn parse_summary(raw: &str) -> Result<GeneratedSummary, AiError> {
    let json = strip_code_fence(raw);

    let value: Value = serde_json::from_str(json)
        .map_err(|e| AiError::InvalidResponse(format!("not valid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| AiError::InvalidResponse("expected a JSON object".to_string()))?;

    let key_points = string_array(object.get("keyPoints"), "keyPoints")?
        .ok_or_else(|| AiError::InvalidResponse("missing keyPoints".to_string()))?;
    if key_points.is_empty() || key_points.iter().any(|p| p.trim().is_empty()) {
        return Err(AiError::InvalidResponse(
            "keyPoints must be a non-empty list of non-empty strings".to_string(),
        ));
    }

    let full_summary = object
        .get("fullSummary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AiError::InvalidResponse("fullSummary must be a non-empty string".to_string()))?
        .to_string();

    let tags = string_array(object.get("tags"), "tags")?.unwrap_or_default();

    Ok(GeneratedSummary {
        key_points: key_points.into_iter().map(|p| p.trim().to_string()).collect(),
        full_summary,
        tags: tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

/// None si absent / null, erreur si ce n'est pas un tableau de strings
fn string_array(value: Option<&Value>, field: &str) -> Result<Option<Vec<String>>, AiError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| AiError::InvalidResponse(format!("{} must contain only strings", field)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(AiError::InvalidResponse(format!("{} must be an array", field))),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_video, ScriptedProvider};

    fn segments(texts: &[&str]) -> Vec<TranscriptSegment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| TranscriptSegment::new(format!("0:{:02}", i), *t))
            .collect()
    }

    #[test]
    fn test_format_and_flatten() {
        let transcript = segments(&["hello", "world"]);
        assert_eq!(format_transcript(&transcript), "[0:00] hello\n[0:01] world");
        assert_eq!(flatten_transcript(&transcript), "hello world");
    }

    #[test]
    fn test_chunks_are_contiguous_and_bounded() {
        // chaque ligne formatée fait 17 caractères: "[0:0x] " + 10 lettres
        let transcript = segments(&["aaaaaaaaaa"; 10]);
        let chunks = chunk_segments(&transcript, 40);

        let rebuilt: Vec<&TranscriptSegment> = chunks.iter().flat_map(|c| c.iter()).collect();
        assert_eq!(rebuilt.len(), transcript.len());
        for (original, chunked) in transcript.iter().zip(rebuilt) {
            assert_eq!(original, chunked);
        }

        for chunk in &chunks {
            assert!(format_transcript(chunk).chars().count() < 40);
        }
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn test_oversized_segment_is_never_split() {
        let long = "x".repeat(100);
        let transcript = segments(&["short", long.as_str(), "short"]);
        let chunks = chunk_segments(&transcript, 30);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(chunks[1][0].text, long);
    }

    #[test]
    fn test_parse_valid_summary_with_fence() {
        let raw = "```json\n{\"keyPoints\":[\"a\",\"b\"],\"fullSummary\":\"text\",\"tags\":[\"rust\"]}\n```";
        let parsed = parse_summary(raw).unwrap();
        assert_eq!(parsed.key_points, vec!["a", "b"]);
        assert_eq!(parsed.full_summary, "text");
        assert_eq!(parsed.tags, vec!["rust"]);
    }

    #[test]
    fn test_parse_allows_missing_tags() {
        let parsed = parse_summary(r#"{"keyPoints":["a"],"fullSummary":"text"}"#).unwrap();
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        let cases = [
            "not json at all",
            r#"["keyPoints"]"#,
            r#"{"keyPoints":[],"fullSummary":"text","tags":[]}"#,
            r#"{"keyPoints":["a", 3],"fullSummary":"text","tags":[]}"#,
            r#"{"keyPoints":["a"],"fullSummary":"","tags":[]}"#,
            r#"{"keyPoints":["a"],"tags":[]}"#,
            r#"{"keyPoints":["a"],"fullSummary":"text","tags":"rust"}"#,
        ];

        for raw in cases {
            assert!(
                matches!(parse_summary(raw), Err(AiError::InvalidResponse(_))),
                "payload should be rejected: {}",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_short_transcript_uses_single_call() {
        let provider = Arc::new(ScriptedProvider::with_responses(vec![Ok(
            r#"{"keyPoints":["one"],"fullSummary":"summary","tags":[]}"#.to_string(),
        )]));
        let summarizer = Summarizer::with_limits(provider.clone(), 50_000, Duration::ZERO);

        let result = summarizer
            .summarize(&segments(&["hello", "world"]), &sample_video("abc"))
            .await
            .unwrap();

        assert_eq!(result.key_points, vec!["one"]);
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].json_output);
        assert!(calls[0].user.contains("[0:00] hello\n[0:01] world"));
    }

    #[tokio::test]
    async fn test_long_transcript_is_chunked_then_synthesized() {
        // seuil 60 → morceaux de moins de 20 caractères: une ligne chacun
        let transcript = segments(&["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc", "dddddddddd"]);
        let provider = Arc::new(ScriptedProvider::with_responses(vec![
            Ok("part one".to_string()),
            Ok("part two".to_string()),
            Ok("part three".to_string()),
            Ok("part four".to_string()),
            Ok(r#"{"keyPoints":["k"],"fullSummary":"final","tags":["t"]}"#.to_string()),
        ]));
        let summarizer = Summarizer::with_limits(provider.clone(), 60, Duration::ZERO);

        let result = summarizer.summarize(&transcript, &sample_video("abc")).await.unwrap();
        assert_eq!(result.full_summary, "final");

        let calls = provider.calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[..4].iter().all(|c| !c.json_output && c.max_tokens == CHUNK_MAX_TOKENS));
        assert!(calls[0].user.contains("aaaaaaaaaa"));
        assert!(calls[3].user.contains("dddddddddd"));

        let last = &calls[4];
        assert!(last.json_output);
        assert!(last.user.contains("part one\n\npart two\n\npart three\n\npart four"));
    }

    #[tokio::test]
    async fn test_chunk_failure_aborts_generation() {
        let transcript = segments(&["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"]);
        let provider = Arc::new(ScriptedProvider::with_responses(vec![
            Ok("part one".to_string()),
            Err(AiError::RateLimited { retry_after: None }),
        ]));
        let summarizer = Summarizer::with_limits(provider.clone(), 30, Duration::ZERO);

        let err = summarizer.summarize(&transcript, &sample_video("abc")).await.unwrap_err();
        assert_eq!(err, AiError::RateLimited { retry_after: None });
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_chunk_summary_is_rejected() {
        let transcript = segments(&["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"]);
        let provider = Arc::new(ScriptedProvider::with_responses(vec![
            Ok("part one".to_string()),
            Ok("  \n ".to_string()),
            Ok("part three".to_string()),
        ]));
        let summarizer = Summarizer::with_limits(provider.clone(), 30, Duration::ZERO);

        let err = summarizer.summarize(&transcript, &sample_video("abc")).await.unwrap_err();
        assert_eq!(err, AiError::EmptyResponse);
        assert_eq!(provider.calls().len(), 2);
    }
}
