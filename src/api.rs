use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    course_service::{CourseService, course_content_digest},
    errors::ApiError,
    generation::{GenerationService, fallback_final_quiz},
    models::*,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub courses: CourseService,
    pub generation: GenerationService,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/course-layout", post(generate_course_layout))
        .route("/api/chapter-content", post(generate_chapter_content))
        .route("/api/quiz", post(generate_quiz))
        .route("/api/final-quiz", post(generate_final_quiz))
        .route(
            "/api/quiz-results",
            get(get_quiz_results).post(submit_quiz_result),
        )
        .route("/api/courses", post(save_course))
        .route("/api/courses/:course_id", get(get_course))
        .route("/api/courses/:course_id/chapters", post(save_chapter))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Resolve the identity key: authenticated user id from the upstream auth
/// layer, else the client-supplied anonymous id, else 401.
fn resolve_identity(headers: &HeaderMap, anon_id: Option<&str>) -> Result<String, ApiError> {
    if let Some(user_id) = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Ok(user_id.to_string());
    }

    anon_id
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

// Generation endpoints

pub async fn generate_course_layout(
    State(state): State<AppState>,
    Json(request): Json<CourseLayoutRequest>,
) -> Result<Json<Value>, ApiError> {
    let params = request
        .validated()
        .ok_or_else(|| ApiError::Validation("Missing required fields".to_string()))?;

    let artifact = state.generation.course_layout(&params).await?;
    Ok(Json(artifact))
}

pub async fn generate_chapter_content(
    State(state): State<AppState>,
    Json(request): Json<ChapterContentRequest>,
) -> Result<Json<Value>, ApiError> {
    let topic = request
        .topic
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let chapter_name = request
        .chapter_name
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let (Some(topic), Some(chapter_name)) = (topic, chapter_name) else {
        return Err(ApiError::Validation(
            "Missing topic or chapterName".to_string(),
        ));
    };

    let artifact = state.generation.chapter_content(topic, chapter_name).await?;
    Ok(Json(artifact))
}

pub async fn generate_quiz(
    State(state): State<AppState>,
    Json(request): Json<QuizRequest>,
) -> Result<Json<Value>, ApiError> {
    let params = request.validated().ok_or_else(|| {
        ApiError::Validation(
            "Provide either topic (and optional category) or notes to generate quiz".to_string(),
        )
    })?;

    let artifact = state.generation.quiz(&params).await?;
    Ok(Json(artifact))
}

pub async fn generate_final_quiz(
    State(state): State<AppState>,
    Json(request): Json<FinalQuizRequest>,
) -> Result<Json<Value>, ApiError> {
    let course_id = request
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("Missing courseId".to_string()))?;
    let count = request.count.unwrap_or(10);

    let course = state
        .courses
        .get_course(course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let chapters = state.courses.chapters(course_id).await?;
    if chapters.is_empty() {
        return Err(ApiError::NotFound(
            "No content found for this course".to_string(),
        ));
    }

    let course_name = course
        .layout
        .get("CourseName")
        .and_then(Value::as_str)
        .unwrap_or(&course.name)
        .to_string();
    let category = course
        .layout
        .get("Category")
        .and_then(Value::as_str)
        .unwrap_or(&course.category)
        .to_string();

    let digest = course_content_digest(&course, &chapters);

    match state
        .generation
        .final_quiz(&course_name, &category, &digest, count)
        .await
    {
        Ok(artifact) => {
            let questions = truncate_questions(&artifact, count);
            Ok(Json(json!({
                "questions": questions,
                "courseName": course_name,
                "category": category,
            })))
        }
        // The only endpoint that degrades instead of surfacing the failure.
        Err(err) => {
            warn!(
                course_id,
                error = %err,
                "AI generation failed, serving templated fallback quiz"
            );
            let questions = fallback_final_quiz(&course_name, &category, count);
            Ok(Json(json!({
                "questions": questions,
                "courseName": course_name,
                "category": category,
                "isFallback": true,
            })))
        }
    }
}

fn truncate_questions(artifact: &Value, count: usize) -> Vec<Value> {
    artifact
        .get("questions")
        .and_then(Value::as_array)
        .map(|questions| questions.iter().take(count).cloned().collect())
        .unwrap_or_default()
}

// Quiz result endpoints

pub async fn get_quiz_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<QuizResultsQuery>,
) -> Result<Json<Value>, ApiError> {
    log_api_start!("get_quiz_results");

    let course_id = query
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("Missing courseId".to_string()))?;

    let identity = resolve_identity(&headers, query.anon_id.as_deref())?;

    match state.courses.results_for(&identity, course_id).await {
        Ok(results) => {
            log_api_success!(
                "get_quiz_results",
                count = results.len(),
                "quiz results retrieved"
            );
            Ok(Json(json!({"results": results})))
        }
        Err(e) => {
            log_api_error!("get_quiz_results", error = e, "failed to load quiz results");
            Err(ApiError::Database(e))
        }
    }
}

pub async fn submit_quiz_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitQuizResultRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let course_id = request
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let (Some(course_id), Some(chapter_id), Some(score), Some(total)) =
        (course_id, request.chapter_id, request.score, request.total)
    else {
        log_api_warn!("submit_quiz_result", "missing or invalid fields");
        return Err(ApiError::Validation("Missing or invalid fields".to_string()));
    };

    let identity = resolve_identity(&headers, request.anon_id.as_deref())?;
    log_api_start!("submit_quiz_result", course_id = course_id);

    match state
        .courses
        .submit_result(
            &identity,
            course_id,
            chapter_id,
            score,
            total,
            request.answers.clone(),
        )
        .await
    {
        Ok((result, created)) => {
            log_api_success!(
                "submit_quiz_result",
                course_id = course_id,
                if created { "quiz result created" } else { "quiz result overwritten" }
            );
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            Ok((status, Json(json!({"ok": true, "result": result}))))
        }
        Err(e) => {
            log_api_error!("submit_quiz_result", error = e, "failed to persist quiz result");
            Err(ApiError::Database(e))
        }
    }
}

// Course storage endpoints

pub async fn save_course(
    State(state): State<AppState>,
    Json(request): Json<SaveCourseRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let course_id = request
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let category = request
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let (Some(course_id), Some(name), Some(category), Some(layout)) =
        (course_id, name, category, request.layout)
    else {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    };

    let course = state
        .courses
        .save_course(
            course_id.to_string(),
            name.to_string(),
            category.to_string(),
            layout,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(json!(course))))
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let course = state
        .courses
        .get_course(&course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    Ok(Json(json!(course)))
}

pub async fn save_chapter(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(request): Json<SaveChapterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (Some(chapter_id), Some(content)) = (request.chapter_id, request.content) else {
        return Err(ApiError::Validation("Missing or invalid fields".to_string()));
    };

    state
        .courses
        .get_course(&course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let chapter = state
        .courses
        .save_chapter(course_id, chapter_id, request.name.clone(), content)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(chapter))))
}
