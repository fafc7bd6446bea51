use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{ProviderConfig, provider_keys};
use crate::errors::ApiError;
use crate::models::{CourseLayoutParams, GeneratedQuestion, QuizParams};
use crate::normalize;
use crate::providers::{
    ChatSpec, GEMINI_FINAL_QUIZ_MODEL, GEMINI_QUIZ_MODEL, GeminiProvider, LAYOUT_MODELS,
    PerplexityProvider, QUIZ_MODELS,
};

/// Free-text notes are clipped before interpolation to keep prompts bounded.
const NOTES_CHAR_LIMIT: usize = 4000;

const STRICT_JSON_SYSTEM: &str =
    "You generate strict JSON only. No markdown, no backticks, no explanations outside the JSON.";
const CHAPTER_SYSTEM: &str = "You output strict JSON only.";
const QUIZ_SYSTEM: &str =
    "You generate quizzes as strict JSON. No markdown, no backticks, no explanations outside the JSON.";

const QUIZ_JSON_SHAPE: &str = r#"{"questions":[{"question":"string","options":["string","string","string","string"],"correctIndex":0-3,"explanation":"string"}]}"#;

/// Prompt construction plus the provider/normalizer pipeline for the four
/// generation operations. Holds no per-request state.
#[derive(Clone)]
pub struct GenerationService {
    perplexity: PerplexityProvider,
    gemini: GeminiProvider,
}

impl GenerationService {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            perplexity: PerplexityProvider::new(config.perplexity_base_url.clone()),
            gemini: GeminiProvider::new(config.gemini_base_url.clone()),
        }
    }

    pub async fn course_layout(&self, params: &CourseLayoutParams) -> Result<Value, ApiError> {
        let api_key =
            provider_keys::perplexity().ok_or(ApiError::MissingApiKey("PPLX_API_KEY"))?;

        let prompt = layout_prompt(params);
        let spec = ChatSpec {
            system: STRICT_JSON_SYSTEM,
            prompt: &prompt,
            max_tokens: 2000,
            schema_name: "course_layout_schema",
            schema: layout_schema(),
        };

        let raw = self
            .perplexity
            .complete_with_fallback(&api_key, LAYOUT_MODELS, &spec)
            .await?;
        let artifact = normalize::parse_artifact(&raw)?;
        normalize::require_non_empty_array(&artifact, "Chapters", &raw, "course layout")?;

        info!(topic = %params.topic, "Course layout generated");
        Ok(artifact)
    }

    pub async fn chapter_content(
        &self,
        topic: &str,
        chapter_name: &str,
    ) -> Result<Value, ApiError> {
        let api_key =
            provider_keys::perplexity().ok_or(ApiError::MissingApiKey("PPLX_API_KEY"))?;

        let prompt = chapter_prompt(topic, chapter_name);
        let spec = ChatSpec {
            system: CHAPTER_SYSTEM,
            prompt: &prompt,
            max_tokens: 2000,
            schema_name: "chapter_content_schema",
            schema: chapter_schema(),
        };

        let raw = self
            .perplexity
            .complete_with_fallback(&api_key, LAYOUT_MODELS, &spec)
            .await?;
        let artifact = normalize::parse_artifact(&raw)?;
        normalize::require_non_empty_array(&artifact, "chapters", &raw, "chapter content")?;

        info!(topic, chapter_name, "Chapter content generated");
        Ok(artifact)
    }

    /// Ad-hoc quiz. Perplexity with model fallback when its key is present;
    /// otherwise a single Gemini call stands in, with no fallback inside
    /// that branch.
    pub async fn quiz(&self, params: &QuizParams) -> Result<Value, ApiError> {
        let prompt = quiz_prompt(params);

        let raw = match provider_keys::perplexity() {
            Some(api_key) => {
                let spec = ChatSpec {
                    system: QUIZ_SYSTEM,
                    prompt: &prompt,
                    max_tokens: 1500,
                    schema_name: "quiz_schema",
                    schema: quiz_schema(),
                };
                self.perplexity
                    .complete_with_fallback(&api_key, QUIZ_MODELS, &spec)
                    .await?
            }
            None => {
                debug!("PPLX_API_KEY absent, using single Gemini call for quiz");
                let api_key =
                    provider_keys::gemini().ok_or(ApiError::MissingApiKey("GEMINI_API_KEY"))?;
                self.gemini
                    .generate_content(&api_key, GEMINI_QUIZ_MODEL, &prompt, 1500)
                    .await?
            }
        };

        let artifact = normalize::parse_artifact(&raw)?;
        normalize::require_non_empty_array(&artifact, "questions", &raw, "quiz")?;
        Ok(artifact)
    }

    /// Course-wide quiz over the stored content digest. Single Gemini call;
    /// the caller degrades to [`fallback_final_quiz`] on any error here.
    pub async fn final_quiz(
        &self,
        course_name: &str,
        category: &str,
        course_content: &str,
        count: usize,
    ) -> Result<Value, ApiError> {
        let api_key = provider_keys::gemini().ok_or(ApiError::MissingApiKey("GEMINI_API_KEY"))?;

        let prompt = final_quiz_prompt(course_name, category, course_content, count);
        let raw = self
            .gemini
            .generate_content(&api_key, GEMINI_FINAL_QUIZ_MODEL, &prompt, 2048)
            .await?;

        let artifact = normalize::parse_artifact(&raw)?;
        normalize::require_non_empty_array(&artifact, "questions", &raw, "quiz")?;

        info!(course_name, count, "Final quiz generated");
        Ok(artifact)
    }
}

fn layout_prompt(params: &CourseLayoutParams) -> String {
    format!(
        r#"Generate a course layout in strict JSON based on these inputs. Do not invent unrelated topics.
Category: {}
Topic: {}
Level: {}
Duration: {}
NoOfChapters: {}

Return ONLY a JSON object matching this schema (no markdown):
{{
  "CourseName": string,
  "Description": string,
  "Category": string,
  "Topic": string,
  "Level": string,
  "Duration": string,
  "NoOfChapters": number,
  "Chapters": [
    {{ "ChapterName": string, "About": string, "Duration": string }}
  ]
}}"#,
        params.category, params.topic, params.level, params.duration, params.no_of_chapters
    )
}

fn chapter_prompt(topic: &str, chapter_name: &str) -> String {
    format!(
        r#"Generate detailed learning content as strict JSON for the following:
Topic: {topic}
Chapter: {chapter_name}

Return ONLY a JSON object with this shape:
{{
  "title": string,
  "chapters": [
    {{ "title": string, "explanation": string, "codeExample": string }}
  ]
}}
codeExample may be "" if not applicable."#
    )
}

fn quiz_prompt(params: &QuizParams) -> String {
    let notes = params
        .notes
        .as_deref()
        .map(|n| n.chars().take(NOTES_CHAR_LIMIT).collect::<String>());

    match notes {
        Some(notes) if !notes.is_empty() => format!(
            "You are a quiz generator. Create {} multiple-choice questions STRICTLY from the notes below. \
             Do NOT introduce any facts not present in the notes.\n\n\
             TOPIC: {}\n\
             NOTES (authoritative, only source of truth):\n- {}\n\n\
             Return ONLY valid JSON (no markdown) shaped as: {}",
            params.count,
            params.topic.as_deref().unwrap_or("General"),
            notes,
            QUIZ_JSON_SHAPE
        ),
        _ => format!(
            "You are a quiz generator. Create {} multiple-choice questions for the TOPIC and CATEGORY below. \
             Ensure coverage of fundamentals and practical applications suitable for learners in this category. \
             Balance difficulty and avoid obscure trivia.\n\n\
             TOPIC: {}\n\
             CATEGORY: {}\n\n\
             Return ONLY valid JSON (no markdown) shaped as: {}",
            params.count,
            params.topic.as_deref().unwrap_or_default(),
            params.category.as_deref().unwrap_or("General"),
            QUIZ_JSON_SHAPE
        ),
    }
}

fn final_quiz_prompt(
    course_name: &str,
    category: &str,
    course_content: &str,
    count: usize,
) -> String {
    format!(
        r#"Generate exactly {count} multiple-choice questions about "{course_name}" (category: {category}).
The questions should cover the main concepts and key points from the entire course.

COURSE CONTENT:
{course_content}

INSTRUCTIONS:
1. Create {count} high-quality multiple-choice questions
2. Each question should have 4 options (A, B, C, D)
3. Only one correct answer per question
4. Include a clear explanation for each answer
5. Questions should cover different aspects of the course
6. Do not include chapter-specific references

Return ONLY valid JSON in this format:
{{
  "questions": [
    {{
      "question": "The question text",
      "options": ["Option A", "Option B", "Option C", "Option D"],
      "correctIndex": 0,
      "explanation": "Explanation of the correct answer"
    }}
  ]
}}"#
    )
}

fn layout_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "CourseName", "Description", "Category", "Topic",
            "Level", "Duration", "NoOfChapters", "Chapters",
        ],
        "properties": {
            "CourseName": {"type": "string"},
            "Description": {"type": "string"},
            "Category": {"type": "string"},
            "Topic": {"type": "string"},
            "Level": {"type": "string"},
            "Duration": {"type": "string"},
            "NoOfChapters": {"type": "number"},
            "Chapters": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["ChapterName", "About", "Duration"],
                    "properties": {
                        "ChapterName": {"type": "string"},
                        "About": {"type": "string"},
                        "Duration": {"type": "string"},
                    },
                },
            },
        },
    })
}

fn chapter_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["title", "chapters"],
        "properties": {
            "title": {"type": "string"},
            "chapters": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["title", "explanation", "codeExample"],
                    "properties": {
                        "title": {"type": "string"},
                        "explanation": {"type": "string"},
                        "codeExample": {"type": "string"},
                    },
                },
            },
        },
    })
}

fn quiz_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["questions"],
        "properties": {
            "questions": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["question", "options", "correctIndex", "explanation"],
                    "properties": {
                        "question": {"type": "string"},
                        "options": {
                            "type": "array",
                            "minItems": 4,
                            "maxItems": 4,
                            "items": {"type": "string"},
                        },
                        "correctIndex": {"type": "integer", "minimum": 0, "maximum": 3},
                        "explanation": {"type": "string"},
                    },
                },
            },
        },
    })
}

/// One fallback question before shuffling: the first option is canonical.
pub struct QuestionTemplate {
    pub question: String,
    pub options: [String; 4],
    pub explanation: String,
}

pub(crate) fn question_templates(course_name: &str, category: &str) -> Vec<QuestionTemplate> {
    vec![
        QuestionTemplate {
            question: format!("What is a key concept in {course_name}?"),
            options: [
                format!("The fundamental principle that underlies {course_name}"),
                format!("A common misconception about {category}"),
                format!("A basic technique used in {category}"),
                format!("An advanced topic in {category}"),
            ],
            explanation: format!(
                "The fundamental principle is the core concept that {course_name} is built upon. \
                 Understanding this concept is essential for mastering the course material."
            ),
        },
        QuestionTemplate {
            question: format!(
                "Which of the following best describes the main goal of {course_name}?"
            ),
            options: [
                format!("To teach students the core principles of {category}"),
                format!("To provide an overview of various {category} topics"),
                format!("To prepare students for advanced studies in {category}"),
                format!("To introduce basic {category} concepts"),
            ],
            explanation: format!(
                "The primary objective of {course_name} is to teach students the core principles \
                 of {category}, providing a solid foundation for understanding the subject matter."
            ),
        },
        QuestionTemplate {
            question: format!("What is an essential skill you'll develop in {course_name}?"),
            options: [
                format!("Analyzing {category} concepts critically"),
                format!("Memorizing {category} terminology"),
                format!("Following {category} procedures"),
                format!("Identifying {category} tools"),
            ],
            explanation: format!(
                "Critical analysis is a key skill in {course_name} as it enables students to \
                 evaluate {category} concepts, theories, and applications effectively."
            ),
        },
        QuestionTemplate {
            question: format!("Which of these is a common application of {category} knowledge?"),
            options: [
                format!("Solving real-world {category} problems"),
                format!("Creating {category} terminology"),
                format!("Memorizing {category} facts"),
                format!("Classifying {category} topics"),
            ],
            explanation: format!(
                "The practical application of {category} knowledge is crucial as it allows \
                 students to solve real-world problems using the concepts learned in {course_name}."
            ),
        },
        QuestionTemplate {
            question: format!("What makes {course_name} important in today's context?"),
            options: [
                format!("Its relevance to current {category} challenges"),
                format!("Its historical significance in {category}"),
                format!("The number of people who study {category}"),
                format!("The complexity of {category} concepts"),
            ],
            explanation: format!(
                "{course_name} is particularly valuable because it addresses current {category} \
                 challenges, making the knowledge directly applicable to modern situations and problems."
            ),
        },
    ]
}

/// Synthesize `count` questions from the templates, cycling when count
/// exceeds the template pool. Each question's options are shuffled and
/// `correct_index` re-derived so it keeps pointing at the canonical option.
pub fn fallback_final_quiz(
    course_name: &str,
    category: &str,
    count: usize,
) -> Vec<GeneratedQuestion> {
    let templates = question_templates(course_name, category);
    let mut rng = rand::thread_rng();

    (0..count)
        .map(|i| {
            let template = &templates[i % templates.len()];
            let mut options = template.options.to_vec();
            options.shuffle(&mut rng);
            let correct_index = options
                .iter()
                .position(|option| *option == template.options[0])
                .unwrap_or(0);

            GeneratedQuestion {
                question: template.question.clone(),
                options,
                correct_index,
                explanation: template.explanation.clone(),
            }
        })
        .collect()
}
