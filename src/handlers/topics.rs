//! # Subtopic Generation Endpoint
//!
//! `POST /api/topics/{topic_id}/subtopics/generate` asks the chat
//! collaborator for age-appropriate lesson subtopics and parses its JSON
//! reply. Plain request/response logic; independent of the streaming core.

use crate::error::{AppError, AppResult};
use crate::prompts::{build_subtopics_prompt, SUBTOPICS_SYSTEM_PROMPT};
use crate::state::AppState;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Lesson difficulty rating produced by the collaborator.
///
/// Serialized in uppercase on the wire ("EASY", "MEDIUM", "HARD").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A practice word with its translation into the target language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeWord {
    pub original: String,
    pub translation: String,
}

/// One generated lesson subtopic.
#[derive(Debug, Clone, Serialize)]
pub struct SubtopicResponse {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub is_completed: bool,
    pub practice_words: Vec<PracticeWord>,
}

/// Request body for subtopic generation.
#[derive(Debug, Deserialize)]
pub struct GenerateSubtopicsRequest {
    pub user_age: u32,
    pub target_language: String,
}

/// What the collaborator is asked to return.
#[derive(Debug, Deserialize)]
struct RawSubtopics {
    subtopics: Vec<RawSubtopic>,
}

#[derive(Debug, Deserialize)]
struct RawSubtopic {
    title: String,
    difficulty: Difficulty,
    practice_words: Vec<PracticeWord>,
}

/// Parse the collaborator's reply into ordered subtopics.
///
/// The model sometimes wraps its JSON in markdown code fences; those are
/// stripped by slicing from the first `{` to the last `}` before parsing.
/// Ids are assigned `"{topic_id}-{n}"`, 1-based, in reply order.
fn parse_subtopics(topic_id: &str, content: &str) -> Result<Vec<SubtopicResponse>, AppError> {
    let mut content = content.trim();
    if content.starts_with("```") {
        let start = content
            .find('{')
            .ok_or_else(|| AppError::BadRequest("no JSON object in reply".to_string()))?;
        let end = content
            .rfind('}')
            .ok_or_else(|| AppError::BadRequest("no JSON object in reply".to_string()))?;
        content = &content[start..=end];
    }

    let raw: RawSubtopics = serde_json::from_str(content)?;

    Ok(raw
        .subtopics
        .into_iter()
        .enumerate()
        .map(|(idx, subtopic)| SubtopicResponse {
            id: format!("{}-{}", topic_id, idx + 1),
            title: subtopic.title,
            difficulty: subtopic.difficulty,
            is_completed: false,
            practice_words: subtopic.practice_words,
        })
        .collect())
}

/// Generate lesson subtopics for a topic.
pub async fn generate_subtopics(
    state: web::Data<AppState>,
    path: web::Path<String>,
    request: web::Json<GenerateSubtopicsRequest>,
) -> AppResult<HttpResponse> {
    let topic_id = path.into_inner();
    let request = request.into_inner();

    if request.user_age == 0 {
        return Err(AppError::ValidationError(
            "user_age must be a positive integer".to_string(),
        ));
    }

    info!(
        topic_id = %topic_id,
        user_age = request.user_age,
        target_language = %request.target_language,
        "generating subtopics"
    );

    let prompt = build_subtopics_prompt(&topic_id, request.user_age, &request.target_language);
    let reply = state
        .chat
        .complete(SUBTOPICS_SYSTEM_PROMPT, &prompt)
        .await
        .map_err(|e| AppError::Upstream(format!("subtopic generation failed: {}", e)))?;

    debug!(reply_chars = reply.len(), "subtopics reply received");
    let subtopics = parse_subtopics(&topic_id, &reply)?;

    Ok(HttpResponse::Ok().json(subtopics))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{
        "subtopics": [
            {
                "title": "Pets at Home",
                "difficulty": "EASY",
                "practice_words": [
                    {"original": "dog", "translation": "perro"},
                    {"original": "cat", "translation": "gato"}
                ]
            },
            {
                "title": "Jungle Animals",
                "difficulty": "MEDIUM",
                "practice_words": [
                    {"original": "monkey", "translation": "mono"},
                    {"original": "snake", "translation": "serpiente"}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let subtopics = parse_subtopics("animals", REPLY).unwrap();
        assert_eq!(subtopics.len(), 2);
        assert_eq!(subtopics[0].id, "animals-1");
        assert_eq!(subtopics[0].title, "Pets at Home");
        assert_eq!(subtopics[0].difficulty, Difficulty::Easy);
        assert!(!subtopics[0].is_completed);
        assert_eq!(subtopics[1].id, "animals-2");
        assert_eq!(subtopics[1].practice_words[0].original, "monkey");
    }

    #[test]
    fn test_parse_strips_markdown_fences() {
        let fenced = format!("```json\n{}\n```", REPLY);
        let subtopics = parse_subtopics("animals", &fenced).unwrap();
        assert_eq!(subtopics.len(), 2);
        assert_eq!(subtopics[1].id, "animals-2");
    }

    #[test]
    fn test_difficulty_wire_format_is_uppercase() {
        assert_eq!(
            serde_json::to_string(&Difficulty::Easy).unwrap(),
            r#""EASY""#
        );
        let parsed: Difficulty = serde_json::from_str(r#""HARD""#).unwrap();
        assert_eq!(parsed, Difficulty::Hard);
    }

    #[test]
    fn test_parse_rejects_unknown_difficulty() {
        let reply = r#"{"subtopics": [{"title": "X", "difficulty": "IMPOSSIBLE", "practice_words": []}]}"#;
        assert!(parse_subtopics("animals", reply).is_err());
    }

    #[test]
    fn test_parse_rejects_non_json_reply() {
        assert!(parse_subtopics("animals", "Sure! Here are some ideas:").is_err());
    }
}
