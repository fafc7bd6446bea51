use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::database::Database;
use crate::models::{Chapter, Course, QuizResult, ScoredQuizResult};

pub const PASS_RECOMMENDATION: &str =
    "Great performance! You can proceed to the next category.";
pub const REVIEW_RECOMMENDATION: &str =
    "You scored below 90%. We recommend reviewing the course before proceeding.";

/// Passing threshold for the recommendation, in percent.
const PASS_THRESHOLD: i64 = 90;

/// Upper bound on the course digest fed into final-quiz prompts.
const DIGEST_CHAR_LIMIT: usize = 10_000;

pub fn percentage(score: i64, total: i64) -> i64 {
    if total == 0 {
        return 0;
    }
    (score as f64 * 100.0 / total as f64).round() as i64
}

pub fn recommendation_for(percentage: i64) -> &'static str {
    if percentage >= PASS_THRESHOLD {
        PASS_RECOMMENDATION
    } else {
        REVIEW_RECOMMENDATION
    }
}

fn score_result(result: QuizResult) -> ScoredQuizResult {
    let percentage = percentage(result.score, result.total);
    ScoredQuizResult {
        result,
        percentage,
        recommendation: recommendation_for(percentage).to_string(),
    }
}

/// Storage-facing service: course/chapter blobs and the quiz-result upsert.
#[derive(Clone)]
pub struct CourseService {
    db: Database,
}

impl CourseService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save_course(
        &self,
        course_id: String,
        name: String,
        category: String,
        layout: Value,
    ) -> Result<Course> {
        let course = Course {
            course_id,
            name,
            category,
            layout,
            created_at: Utc::now(),
        };
        self.db.upsert_course(&course).await?;
        info!(course_id = %course.course_id, "Course layout stored");
        Ok(course)
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        self.db.get_course(course_id).await
    }

    pub async fn save_chapter(
        &self,
        course_id: String,
        chapter_id: i64,
        name: Option<String>,
        content: Value,
    ) -> Result<Chapter> {
        let chapter = Chapter {
            course_id,
            chapter_id,
            name,
            content,
            created_at: Utc::now(),
        };
        self.db.upsert_chapter(&chapter).await?;
        Ok(chapter)
    }

    pub async fn chapters(&self, course_id: &str) -> Result<Vec<Chapter>> {
        self.db.list_chapters(course_id).await
    }

    /// Lookup-then-write upsert for one (identity, course, chapter) triple.
    /// Returns the stored record with derived fields, and whether a new row
    /// was created. Concurrent submissions for the same triple can race;
    /// the domain tolerates last-write-wins.
    pub async fn submit_result(
        &self,
        identity: &str,
        course_id: &str,
        chapter_id: i64,
        score: i64,
        total: i64,
        answers: Option<Value>,
    ) -> Result<(ScoredQuizResult, bool)> {
        let existing = self
            .db
            .find_quiz_result(identity, course_id, chapter_id)
            .await?;

        let (record, created) = if existing.is_some() {
            let updated = self
                .db
                .update_quiz_result(identity, course_id, chapter_id, score, total, answers.as_ref())
                .await?;
            debug!(course_id, chapter_id, "Quiz result overwritten");
            (updated, false)
        } else {
            let inserted = self
                .db
                .insert_quiz_result(identity, course_id, chapter_id, score, total, answers.as_ref())
                .await?;
            debug!(course_id, chapter_id, "Quiz result created");
            (inserted, true)
        };

        Ok((score_result(record), created))
    }

    pub async fn results_for(
        &self,
        identity: &str,
        course_id: &str,
    ) -> Result<Vec<ScoredQuizResult>> {
        let rows = self.db.list_quiz_results(identity, course_id).await?;
        Ok(rows.into_iter().map(score_result).collect())
    }
}

/// Flatten a stored course and its chapters into a plain-text digest for
/// final-quiz prompting, capped at 10000 characters.
pub fn course_content_digest(course: &Course, chapters: &[Chapter]) -> String {
    let mut content: Vec<String> = Vec::new();

    if let Some(name) = course.layout.get("CourseName").and_then(Value::as_str) {
        content.push(format!("Course: {name}"));
    }
    if let Some(description) = course.layout.get("Description").and_then(Value::as_str) {
        content.push(format!("Description: {description}"));
    }

    if let Some(objectives) = course
        .layout
        .get("LearningObjectives")
        .and_then(Value::as_array)
        .filter(|list| !list.is_empty())
    {
        content.push("\nLearning Objectives:".to_string());
        for (i, objective) in objectives.iter().enumerate() {
            if let Some(text) = objective.as_str() {
                content.push(format!("{}. {}", i + 1, text));
            }
        }
    }

    for (idx, chapter) in chapters.iter().enumerate() {
        let title = chapter
            .name
            .clone()
            .unwrap_or_else(|| format!("Chapter {}", idx + 1));
        content.push(format!("\n## {title}"));

        if let Some(sections) = chapter.content.get("chapters").and_then(Value::as_array) {
            for section in sections {
                if let Some(section_title) = section.get("title").and_then(Value::as_str) {
                    content.push(format!("### {section_title}"));
                }
                if let Some(explanation) = section.get("explanation").and_then(Value::as_str) {
                    content.push(explanation.to_string());
                }
            }
        }
    }

    content.join("\n").chars().take(DIGEST_CHAR_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn percentage_rounds_and_handles_zero_total() {
        assert_eq!(percentage(9, 10), 90);
        assert_eq!(percentage(8, 10), 80);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 0), 0);
    }

    #[test]
    fn recommendation_threshold_is_strictly_at_90() {
        assert_eq!(recommendation_for(percentage(9, 10)), PASS_RECOMMENDATION);
        assert_eq!(recommendation_for(percentage(10, 10)), PASS_RECOMMENDATION);
        assert_eq!(recommendation_for(percentage(8, 10)), REVIEW_RECOMMENDATION);
        assert_eq!(recommendation_for(89), REVIEW_RECOMMENDATION);
        assert_eq!(recommendation_for(90), PASS_RECOMMENDATION);
    }

    #[test]
    fn digest_includes_course_metadata_and_sections() {
        let course = Course {
            course_id: "c-1".to_string(),
            name: "Rust Basics".to_string(),
            category: "Programming".to_string(),
            layout: json!({
                "CourseName": "Rust Basics",
                "Description": "An introduction to Rust",
            }),
            created_at: Utc::now(),
        };
        let chapters = vec![Chapter {
            course_id: "c-1".to_string(),
            chapter_id: 1,
            name: Some("Ownership".to_string()),
            content: json!({
                "chapters": [
                    {"title": "Moves", "explanation": "Values move by default"},
                ]
            }),
            created_at: Utc::now(),
        }];

        let digest = course_content_digest(&course, &chapters);
        assert!(digest.contains("Course: Rust Basics"));
        assert!(digest.contains("## Ownership"));
        assert!(digest.contains("### Moves"));
        assert!(digest.contains("Values move by default"));
    }

    #[test]
    fn digest_falls_back_to_positional_chapter_titles_and_is_capped() {
        let course = Course {
            course_id: "c-2".to_string(),
            name: "Big Course".to_string(),
            category: "General".to_string(),
            layout: json!({}),
            created_at: Utc::now(),
        };
        let chapters = vec![Chapter {
            course_id: "c-2".to_string(),
            chapter_id: 1,
            name: None,
            content: json!({
                "chapters": [{"title": "T", "explanation": "e".repeat(20_000)}]
            }),
            created_at: Utc::now(),
        }];

        let digest = course_content_digest(&course, &chapters);
        assert!(digest.contains("## Chapter 1"));
        assert_eq!(digest.chars().count(), 10_000);
    }
}
