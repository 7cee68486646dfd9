use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use validator::{Validate, ValidationError};

use super::quiz::QuizSummary;
use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

const VIDEO_HOSTS: [&str; 3] = ["youtube.com", "youtu.be", "vimeo.com"];

/// Lesson document; `(course_id, order)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub course_id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub content: String,
    pub order: u32,
    pub duration_minutes: u32,
    #[serde(default)]
    pub is_free: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    /// Full running time in seconds.
    pub fn duration_seconds(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }

    /// Watching this many seconds counts as finishing the lesson (80 %).
    pub fn completion_threshold_seconds(&self) -> u64 {
        self.duration_seconds() * 4 / 5
    }
}

/// Per-student watch/completion record; `(student_id, lesson_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonProgress {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: ObjectId,
    pub lesson_id: ObjectId,
    pub course_id: ObjectId,
    pub is_completed: bool,
    /// Seconds watched.
    pub watched_duration: u64,
    #[serde(
        rename = "completedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    pub fn new(student_id: ObjectId, lesson: &Lesson) -> Self {
        Self {
            id: ObjectId::new(),
            student_id,
            lesson_id: lesson.id,
            course_id: lesson.course_id,
            is_completed: false,
            watched_duration: 0,
            completed_at: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[validate(custom(function = "validate_video_url"))]
    pub video_url: Option<String>,

    #[serde(default)]
    pub content: String,

    #[validate(range(min = 1, max = 300, message = "Duration must be between 1 and 300 minutes"))]
    pub duration_minutes: u32,

    #[serde(default)]
    pub is_free: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLessonRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[validate(custom(function = "validate_video_url"))]
    pub video_url: Option<String>,

    #[serde(default)]
    pub content: String,

    #[validate(range(min = 1, max = 300, message = "Duration must be between 1 and 300 minutes"))]
    pub duration_minutes: u32,

    #[serde(default)]
    pub is_free: bool,

    #[validate(range(min = 1, message = "Order must be at least 1"))]
    pub order: Option<u32>,
}

/// Body of the update-progress endpoint. Accepts either a JSON number or a
/// form string, so the raw value is kept and parsed by the service.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProgressRequest {
    #[serde(default)]
    pub watched_duration: Option<serde_json::Value>,
}

impl UpdateProgressRequest {
    /// `None` when the value is present but not an integer. A missing value
    /// counts as zero.
    pub fn seconds(&self) -> Option<i64> {
        match &self.watched_duration {
            None | Some(serde_json::Value::Null) => Some(0),
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReorderLessonsRequest {
    pub lesson_order: Vec<String>,
}

fn validate_video_url(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Ok(());
    }

    let host = url::Url::parse(raw.trim())
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase));

    let Some(host) = host else {
        let mut error = ValidationError::new("url");
        error.message = Some(Cow::Borrowed("Enter a valid URL"));
        return Err(error);
    };

    let allowed = VIDEO_HOSTS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)));

    if allowed {
        Ok(())
    } else {
        let mut error = ValidationError::new("video_host");
        error.message = Some(Cow::Borrowed("Only YouTube or Vimeo links are allowed"));
        Err(error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonSummary {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub duration_minutes: u32,
    pub is_free: bool,
    pub has_video: bool,
}

impl From<&Lesson> for LessonSummary {
    fn from(lesson: &Lesson) -> Self {
        LessonSummary {
            id: lesson.id.to_hex(),
            course_id: lesson.course_id.to_hex(),
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            order: lesson.order,
            duration_minutes: lesson.duration_minutes,
            is_free: lesson.is_free,
            has_video: !lesson.video_url.is_empty(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LessonDetail {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub content: String,
    pub order: u32,
    pub duration_minutes: u32,
    pub is_free: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Lesson> for LessonDetail {
    fn from(lesson: Lesson) -> Self {
        LessonDetail {
            id: lesson.id.to_hex(),
            course_id: lesson.course_id.to_hex(),
            title: lesson.title,
            description: lesson.description,
            video_url: lesson.video_url,
            content: lesson.content,
            order: lesson.order,
            duration_minutes: lesson.duration_minutes,
            is_free: lesson.is_free,
            created_at: lesson.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub lesson_id: String,
    pub is_completed: bool,
    pub watched_duration: u64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&LessonProgress> for ProgressView {
    fn from(progress: &LessonProgress) -> Self {
        ProgressView {
            lesson_id: progress.lesson_id.to_hex(),
            is_completed: progress.is_completed,
            watched_duration: progress.watched_duration,
            completed_at: progress.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LessonListResponse {
    pub course: CourseRef,
    pub lessons: Vec<LessonSummary>,
    pub is_enrolled: bool,
    pub can_view: bool,
    /// Keyed by lesson id; empty unless the caller is enrolled.
    pub lesson_progress: HashMap<String, ProgressView>,
}

#[derive(Debug, Serialize)]
pub struct LessonDetailResponse {
    pub course: CourseRef,
    pub lesson: LessonDetail,
    pub lesson_progress: Option<ProgressView>,
    pub quizzes: Vec<QuizSummary>,
    pub prev_lesson: Option<LessonSummary>,
    pub next_lesson: Option<LessonSummary>,
    pub is_enrolled: bool,
}

/// Envelope for the mark-complete and update-progress endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct LessonProgressReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
}

impl LessonProgressReply {
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            watched_duration: None,
            is_completed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson_request(video_url: Option<&str>) -> CreateLessonRequest {
        CreateLessonRequest {
            title: "Ownership basics".to_string(),
            description: String::new(),
            video_url: video_url.map(str::to_string),
            content: String::new(),
            duration_minutes: 10,
            is_free: false,
        }
    }

    #[test]
    fn video_url_accepts_youtube_and_vimeo() {
        for url in [
            "https://www.youtube.com/watch?v=abc",
            "https://youtu.be/abc",
            "https://vimeo.com/12345",
        ] {
            assert!(lesson_request(Some(url)).validate().is_ok(), "{}", url);
        }
        assert!(lesson_request(Some("")).validate().is_ok());
        assert!(lesson_request(None).validate().is_ok());
    }

    #[test]
    fn video_url_rejects_other_hosts() {
        let errors = lesson_request(Some("https://example.com/youtube.com"))
            .validate()
            .unwrap_err();
        assert!(errors.field_errors().contains_key("video_url"));
    }

    #[test]
    fn progress_seconds_parses_numbers_and_strings() {
        let from_json = UpdateProgressRequest {
            watched_duration: Some(serde_json::json!(120)),
        };
        assert_eq!(from_json.seconds(), Some(120));

        let from_form = UpdateProgressRequest {
            watched_duration: Some(serde_json::json!(" 45 ")),
        };
        assert_eq!(from_form.seconds(), Some(45));

        let garbage = UpdateProgressRequest {
            watched_duration: Some(serde_json::json!("abc")),
        };
        assert_eq!(garbage.seconds(), None);

        assert_eq!(UpdateProgressRequest::default().seconds(), Some(0));
    }

    #[test]
    fn completion_threshold_is_eighty_percent() {
        let lesson = Lesson {
            id: ObjectId::new(),
            course_id: ObjectId::new(),
            title: "Traits".to_string(),
            description: String::new(),
            video_url: String::new(),
            content: String::new(),
            order: 1,
            duration_minutes: 10,
            is_free: false,
            created_at: Utc::now(),
        };
        assert_eq!(lesson.duration_seconds(), 600);
        assert_eq!(lesson.completion_threshold_seconds(), 480);
    }
}
