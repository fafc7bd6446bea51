use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A stored course: layout artifact kept verbatim as an opaque JSON blob,
/// with name/category lifted out for lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
    pub name: String,
    pub category: String,
    pub layout: Value,
    pub created_at: DateTime<Utc>,
}

/// Generated chapter content stored verbatim, ordered by chapter_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub course_id: String,
    pub chapter_id: i64,
    pub name: Option<String>,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

/// One quiz submission per (identity, course, chapter) triple. The identity
/// key is either an authenticated user id or a client-generated anonymous id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub chapter_id: i64,
    pub score: i64,
    pub total: i64,
    pub answers: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A quiz result augmented with the derived percentage and recommendation.
/// Never stored; computed on every read and write.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredQuizResult {
    #[serde(flatten)]
    pub result: QuizResult,
    pub percentage: i64,
    pub recommendation: String,
}

/// A multiple-choice question produced by the templated fallback generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
}

// ---------------------------------------------------------------------------
// Wire types. Required fields are Options so missing/empty values surface as
// a 400 from handler validation instead of a body-deserialization rejection.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseLayoutRequest {
    pub category: Option<String>,
    pub topic: Option<String>,
    pub level: Option<String>,
    pub duration: Option<String>,
    pub no_of_chapters: Option<i64>,
}

/// Validated course-layout inputs.
#[derive(Debug, Clone)]
pub struct CourseLayoutParams {
    pub category: String,
    pub topic: String,
    pub level: String,
    pub duration: String,
    pub no_of_chapters: i64,
}

impl CourseLayoutRequest {
    /// All five fields present and non-empty; a chapter count of zero is
    /// treated as absent.
    pub fn validated(&self) -> Option<CourseLayoutParams> {
        let category = non_empty(self.category.as_deref())?;
        let topic = non_empty(self.topic.as_deref())?;
        let level = non_empty(self.level.as_deref())?;
        let duration = non_empty(self.duration.as_deref())?;
        let no_of_chapters = self.no_of_chapters.filter(|n| *n > 0)?;
        Some(CourseLayoutParams {
            category,
            topic,
            level,
            duration,
            no_of_chapters,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContentRequest {
    pub topic: Option<String>,
    pub chapter_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    pub topic: Option<String>,
    pub category: Option<String>,
    #[serde(alias = "bullets")]
    pub notes: Option<String>,
    pub count: Option<u32>,
}

/// Validated ad-hoc quiz inputs: at least one of topic/notes is non-empty.
#[derive(Debug, Clone)]
pub struct QuizParams {
    pub topic: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub count: u32,
}

impl QuizRequest {
    pub fn validated(&self) -> Option<QuizParams> {
        let topic = non_empty(self.topic.as_deref());
        let notes = non_empty(self.notes.as_deref());
        if topic.is_none() && notes.is_none() {
            return None;
        }
        Some(QuizParams {
            topic,
            category: non_empty(self.category.as_deref()),
            notes,
            count: self.count.unwrap_or(6),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalQuizRequest {
    pub course_id: Option<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizResultRequest {
    pub course_id: Option<String>,
    pub chapter_id: Option<i64>,
    pub score: Option<i64>,
    pub total: Option<i64>,
    pub answers: Option<Value>,
    pub anon_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultsQuery {
    pub course_id: Option<String>,
    pub anon_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCourseRequest {
    pub course_id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub layout: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveChapterRequest {
    pub chapter_id: Option<i64>,
    pub name: Option<String>,
    pub content: Option<Value>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_request_rejects_missing_and_blank_fields() {
        let request = CourseLayoutRequest {
            category: Some("Programming".to_string()),
            topic: Some("   ".to_string()),
            level: Some("Beginner".to_string()),
            duration: Some("2 hours".to_string()),
            no_of_chapters: Some(5),
        };
        assert!(request.validated().is_none());

        let request = CourseLayoutRequest {
            category: Some("Programming".to_string()),
            topic: Some("Rust".to_string()),
            level: Some("Beginner".to_string()),
            duration: Some("2 hours".to_string()),
            no_of_chapters: Some(0),
        };
        assert!(request.validated().is_none());
    }

    #[test]
    fn layout_request_accepts_complete_input() {
        let request = CourseLayoutRequest {
            category: Some("Programming".to_string()),
            topic: Some("Rust".to_string()),
            level: Some("Beginner".to_string()),
            duration: Some("2 hours".to_string()),
            no_of_chapters: Some(5),
        };
        let params = request.validated().unwrap();
        assert_eq!(params.topic, "Rust");
        assert_eq!(params.no_of_chapters, 5);
    }

    #[test]
    fn quiz_request_needs_topic_or_notes() {
        let request = QuizRequest {
            topic: None,
            category: Some("Science".to_string()),
            notes: Some("".to_string()),
            count: None,
        };
        assert!(request.validated().is_none());

        let request = QuizRequest {
            topic: None,
            category: None,
            notes: Some("Water boils at 100C at sea level".to_string()),
            count: None,
        };
        let params = request.validated().unwrap();
        assert_eq!(params.count, 6);
        assert!(params.notes.is_some());
    }

    #[test]
    fn quiz_request_accepts_bullets_alias() {
        let request: QuizRequest =
            serde_json::from_str(r#"{"bullets": "note one", "count": 4}"#).unwrap();
        let params = request.validated().unwrap();
        assert_eq!(params.notes.as_deref(), Some("note one"));
        assert_eq!(params.count, 4);
    }
}
