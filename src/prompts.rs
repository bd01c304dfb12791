//! # Prompt Construction
//!
//! Pure, deterministic prompt building for the tutoring pipeline and the
//! subtopic generation endpoint. Nothing in this module performs I/O; the
//! same inputs always produce the same instruction string, which keeps the
//! chat collaborator's behavior reproducible in tests.

use crate::voice::session::UserProfile;

/// Build the system instruction for one tutoring turn.
///
/// ## Purpose:
/// The chat collaborator receives exactly two messages per turn: this system
/// instruction (derived from the immutable session profile) and the child's
/// transcript. No conversation history is carried between turns, so all the
/// tutoring context has to be encoded here.
///
/// ## Determinism:
/// Pure string interpolation over the profile fields. Callers may invoke this
/// once per turn without caching; it is cheap and side-effect free.
pub fn build_system_instruction(profile: &UserProfile) -> String {
    format!(
        r#"You are an AI language tutor helping a {age}-year-old child learn {language}.
Current topic: {topic}

ROLE:
- Listen to the child's attempts to speak {language}
- Respond in {language} first, then provide English translation
- Explain key words and phrases they can use
- Gently correct pronunciation or grammar mistakes
- Keep the conversation focused on {topic}

RESPONSE FORMAT:
1. Main Response:
   {language}: [Your response in target language]
   English: [Simple translation]

2. Teaching Moment:
   New Words: [List 1-2 relevant words with pronunciation]
   Try Saying: [Simple phrase they can practice]

3. If correction needed:
   I heard: [What they said]
   Better way: [Correct form]
   Tip: [Simple explanation]

EXAMPLE INTERACTION:
Child: "I like perro"
Assistant:
{language}: ¡Ah! Te gustan los perros. ¿Tienes un perro en casa?
English: Ah! You like dogs. Do you have a dog at home?

New Words:
- perro (peh-rro) = dog
- mascota (mas-ko-ta) = pet

Try Saying: "Tengo un perro" (I have a dog)

Tip: In Spanish, we say "Me gustan los perros" for "I like dogs"

Remember:
- Keep explanations simple and fun
- Use lots of examples
- Encourage practice
- Celebrate their attempts
- Stay at their level ({proficiency})"#,
        age = profile.user_age,
        language = profile.target_language,
        topic = profile.topic,
        proficiency = profile.proficiency_level,
    )
}

/// System message for the subtopic generation endpoint.
pub const SUBTOPICS_SYSTEM_PROMPT: &str = "You are a helpful language teaching assistant. \
You need to create conversations that are fun, open ended, current, culturally relevant \
and can lead to long organic conversations.";

/// Build the user prompt asking the chat collaborator for lesson subtopics.
///
/// The reply is expected to be a JSON object with a `subtopics` array; see
/// `handlers::topics` for the parsing rules.
pub fn build_subtopics_prompt(topic: &str, user_age: u32, target_language: &str) -> String {
    format!(
        r#"Generate 3 age-appropriate subtopics for teaching a {age} year old about {topic}.
The practice words should be in {language}.
For each subtopic, include a title, difficulty (EASY/MEDIUM/HARD), and 2 practice words with translations.
These topics have to be fun based on the age of the user. Think of topics that can lead to open ended long conversations that keep the user engaged and
are culturally relevant to current events and trends. Return this as a JSON object in this format:

Return ONLY a JSON response with an array of 'subtopics'. Each subtopic should have:
- A 'title' field (string)
- A 'difficulty' field (must be exactly: EASY, MEDIUM, or HARD)
- A 'practice_words' array containing objects with 'original' and 'translation' fields
Do not include any other fields or explanations.
"#,
        age = user_age,
        topic = topic,
        language = target_language,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> UserProfile {
        UserProfile {
            target_language: "Spanish".to_string(),
            topic: "Animals".to_string(),
            user_age: 7,
            proficiency_level: "beginner".to_string(),
        }
    }

    /// Same profile in, identical instruction out.
    #[test]
    fn test_system_instruction_is_deterministic() {
        let profile = sample_profile();
        let first = build_system_instruction(&profile);
        let second = build_system_instruction(&profile);
        assert_eq!(first, second);
    }

    #[test]
    fn test_system_instruction_embeds_profile_fields() {
        let instruction = build_system_instruction(&sample_profile());
        assert!(instruction.contains("7-year-old"));
        assert!(instruction.contains("learn Spanish"));
        assert!(instruction.contains("Current topic: Animals"));
        assert!(instruction.contains("their level (beginner)"));
    }

    #[test]
    fn test_system_instruction_varies_with_profile() {
        let spanish = build_system_instruction(&sample_profile());
        let mut profile = sample_profile();
        profile.target_language = "French".to_string();
        let french = build_system_instruction(&profile);
        assert_ne!(spanish, french);
        assert!(french.contains("learn French"));
    }

    #[test]
    fn test_subtopics_prompt_embeds_parameters() {
        let prompt = build_subtopics_prompt("dinosaurs", 9, "German");
        assert!(prompt.contains("a 9 year old about dinosaurs"));
        assert!(prompt.contains("words should be in German"));
        assert!(prompt.contains("EASY, MEDIUM, or HARD"));
    }
}
