use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{Chapter, Course, QuizResult};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Single-connection in-memory database for tests. More than one
    /// connection would mean more than one independent database.
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                course_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                layout TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapters (
                course_id TEXT NOT NULL,
                chapter_id INTEGER NOT NULL,
                name TEXT,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (course_id, chapter_id),
                FOREIGN KEY (course_id) REFERENCES courses(course_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // No uniqueness constraint on (user_id, course_id, chapter_id); the
        // upsert is application-level lookup-then-write, last write wins.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quiz_results (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                chapter_id INTEGER NOT NULL,
                score INTEGER NOT NULL,
                total INTEGER NOT NULL,
                answers TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_quiz_results_identity
             ON quiz_results(user_id, course_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Course operations

    pub async fn upsert_course(&self, course: &Course) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO courses (course_id, name, category, layout, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&course.course_id)
        .bind(&course.name)
        .bind(&course.category)
        .bind(serde_json::to_string(&course.layout)?)
        .bind(course.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT * FROM courses WHERE course_id = ?1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_course).transpose()
    }

    pub async fn upsert_chapter(&self, chapter: &Chapter) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO chapters (course_id, chapter_id, name, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&chapter.course_id)
        .bind(chapter.chapter_id)
        .bind(&chapter.name)
        .bind(serde_json::to_string(&chapter.content)?)
        .bind(chapter.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>> {
        let rows = sqlx::query("SELECT * FROM chapters WHERE course_id = ?1 ORDER BY chapter_id")
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_chapter).collect()
    }

    // Quiz result operations

    pub async fn find_quiz_result(
        &self,
        user_id: &str,
        course_id: &str,
        chapter_id: i64,
    ) -> Result<Option<QuizResult>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM quiz_results
            WHERE user_id = ?1 AND course_id = ?2 AND chapter_id = ?3
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(chapter_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_quiz_result).transpose()
    }

    pub async fn insert_quiz_result(
        &self,
        user_id: &str,
        course_id: &str,
        chapter_id: i64,
        score: i64,
        total: i64,
        answers: Option<&Value>,
    ) -> Result<QuizResult> {
        let now = Utc::now();
        let record = QuizResult {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            chapter_id,
            score,
            total,
            answers: answers.cloned(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO quiz_results (id, user_id, course_id, chapter_id, score, total,
                                      answers, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(&record.course_id)
        .bind(record.chapter_id)
        .bind(record.score)
        .bind(record.total)
        .bind(
            record
                .answers
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// Overwrite score/total/answers in place for the triple, keyed the same
    /// way the lookup is. Returns the row as stored after the write.
    pub async fn update_quiz_result(
        &self,
        user_id: &str,
        course_id: &str,
        chapter_id: i64,
        score: i64,
        total: i64,
        answers: Option<&Value>,
    ) -> Result<QuizResult> {
        sqlx::query(
            r#"
            UPDATE quiz_results
            SET score = ?1, total = ?2, answers = ?3, updated_at = ?4
            WHERE user_id = ?5 AND course_id = ?6 AND chapter_id = ?7
            "#,
        )
        .bind(score)
        .bind(total)
        .bind(answers.map(serde_json::to_string).transpose()?)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .bind(course_id)
        .bind(chapter_id)
        .execute(&self.pool)
        .await?;

        self.find_quiz_result(user_id, course_id, chapter_id)
            .await?
            .context("quiz result row missing after update")
    }

    pub async fn list_quiz_results(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Vec<QuizResult>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM quiz_results
            WHERE user_id = ?1 AND course_id = ?2
            ORDER BY chapter_id
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_quiz_result).collect()
    }
}

fn row_to_course(row: SqliteRow) -> Result<Course> {
    Ok(Course {
        course_id: row.get("course_id"),
        name: row.get("name"),
        category: row.get("category"),
        layout: serde_json::from_str(&row.get::<String, _>("layout"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn row_to_chapter(row: SqliteRow) -> Result<Chapter> {
    Ok(Chapter {
        course_id: row.get("course_id"),
        chapter_id: row.get("chapter_id"),
        name: row.get("name"),
        content: serde_json::from_str(&row.get::<String, _>("content"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn row_to_quiz_result(row: SqliteRow) -> Result<QuizResult> {
    Ok(QuizResult {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        user_id: row.get("user_id"),
        course_id: row.get("course_id"),
        chapter_id: row.get("chapter_id"),
        score: row.get("score"),
        total: row.get("total"),
        answers: row
            .get::<Option<String>, _>("answers")
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
