use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::lesson::CourseRef;
use super::user::UserSummary;
use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option, Page};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub lesson_id: ObjectId,
    pub course_id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Minimum score (percent) that counts as passed.
    pub passing_score: u32,
    /// Minutes.
    pub time_limit: u32,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

/// Question with its choices embedded in the same document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub quiz_id: ObjectId,
    pub text: String,
    pub order: u32,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl Question {
    pub fn choice(&self, choice_id: ObjectId) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.id == choice_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: ObjectId,
    pub text: String,
    pub is_correct: bool,
}

/// One scored submission. Attempts are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: ObjectId,
    pub quiz_id: ObjectId,
    pub course_id: ObjectId,
    pub score: u32,
    pub is_passed: bool,
    #[serde(rename = "startedAt", with = "bson_datetime_as_chrono")]
    pub started_at: DateTime<Utc>,
    #[serde(
        rename = "completedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answers: Vec<AttemptAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptAnswer {
    pub question_id: ObjectId,
    pub choice_id: Option<ObjectId>,
    pub is_correct: bool,
}

/// In-progress answers saved while a student is taking a quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDraft {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: ObjectId,
    pub quiz_id: ObjectId,
    pub data: serde_json::Value,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

fn default_passing_score() -> u32 {
    70
}

fn default_time_limit() -> u32 {
    30
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_passing_score")]
    #[validate(range(max = 100, message = "Passing score must be between 0 and 100"))]
    pub passing_score: u32,

    #[serde(default = "default_time_limit")]
    #[validate(range(min = 1, max = 180, message = "Time limit must be between 1 and 180 minutes"))]
    pub time_limit: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddQuestionRequest {
    #[validate(length(min = 10, message = "Question must be at least 10 characters"))]
    pub text: String,

    #[serde(default)]
    pub choices: Vec<ChoiceInput>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceInput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Answers keyed by question id, each naming the selected choice id.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitQuizRequest {
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MyResultsQuery {
    pub course: Option<String>,
    pub passed: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizSummary {
    pub id: String,
    pub lesson_id: String,
    pub title: String,
    pub description: String,
    pub passing_score: u32,
    pub time_limit: u32,
}

impl From<&Quiz> for QuizSummary {
    fn from(quiz: &Quiz) -> Self {
        QuizSummary {
            id: quiz.id.to_hex(),
            lesson_id: quiz.lesson_id.to_hex(),
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            passing_score: quiz.passing_score,
            time_limit: quiz.time_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub id: String,
    pub quiz_id: String,
    pub score: u32,
    pub is_passed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&QuizAttempt> for AttemptSummary {
    fn from(attempt: &QuizAttempt) -> Self {
        AttemptSummary {
            id: attempt.id.to_hex(),
            quiz_id: attempt.quiz_id.to_hex(),
            score: attempt.score,
            is_passed: attempt.is_passed,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuizListItem {
    pub quiz: QuizSummary,
    pub latest_attempt: Option<AttemptSummary>,
}

#[derive(Debug, Serialize)]
pub struct QuizListResponse {
    pub lesson: CourseRef,
    pub course: CourseRef,
    pub quizzes: Vec<QuizListItem>,
    pub is_enrolled: bool,
}

#[derive(Debug, Serialize)]
pub struct QuizDetailResponse {
    pub quiz: QuizSummary,
    pub course: CourseRef,
    pub questions_count: u64,
    pub user_attempts: Vec<AttemptSummary>,
    pub best_score: u32,
    pub can_attempt: bool,
    pub max_attempts: u32,
    pub is_enrolled: bool,
}

#[derive(Debug, Serialize)]
pub struct ChoiceView {
    pub id: String,
    pub text: String,
    /// Hidden while a student is taking the quiz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub order: u32,
    pub choices: Vec<ChoiceView>,
}

impl QuestionView {
    pub fn from_question(question: &Question, reveal_answers: bool) -> Self {
        QuestionView {
            id: question.id.to_hex(),
            text: question.text.clone(),
            order: question.order,
            choices: question
                .choices
                .iter()
                .map(|choice| ChoiceView {
                    id: choice.id.to_hex(),
                    text: choice.text.clone(),
                    is_correct: reveal_answers.then_some(choice.is_correct),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TakeQuizResponse {
    pub quiz: QuizSummary,
    pub course: CourseRef,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Serialize)]
pub struct AnsweredQuestion {
    #[serde(flatten)]
    pub question: QuestionView,
    pub selected_choice_id: Option<String>,
    pub is_correct: bool,
}

#[derive(Debug, Serialize)]
pub struct AttemptResultResponse {
    pub attempt: AttemptSummary,
    pub quiz: QuizSummary,
    pub questions: Vec<AnsweredQuestion>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ScoreRanges {
    #[serde(rename = "90-100")]
    pub excellent: u64,
    #[serde(rename = "80-89")]
    pub good: u64,
    #[serde(rename = "70-79")]
    pub satisfactory: u64,
    #[serde(rename = "60-69")]
    pub weak: u64,
    #[serde(rename = "0-59")]
    pub failing: u64,
}

impl ScoreRanges {
    pub fn record(&mut self, score: u32) {
        match score {
            90.. => self.excellent += 1,
            80..=89 => self.good += 1,
            70..=79 => self.satisfactory += 1,
            60..=69 => self.weak += 1,
            _ => self.failing += 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StudentAttempt {
    pub attempt: AttemptSummary,
    pub student: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct QuizStatisticsResponse {
    pub quiz: QuizSummary,
    pub total_attempts: u64,
    pub unique_students: u64,
    pub passed_attempts: u64,
    pub pass_rate: f64,
    pub avg_score: f64,
    pub score_ranges: ScoreRanges,
    pub recent_attempts: Vec<StudentAttempt>,
}

#[derive(Debug, Serialize)]
pub struct ResultRow {
    pub attempt: AttemptSummary,
    pub quiz_title: String,
    pub course: Option<CourseRef>,
}

#[derive(Debug, Serialize)]
pub struct MyResultsStats {
    pub total_attempts: u64,
    pub passed_attempts: u64,
    pub avg_score: f64,
}

#[derive(Debug, Serialize)]
pub struct MyResultsResponse {
    pub attempts: Page<ResultRow>,
    pub stats: MyResultsStats,
    pub enrolled_courses: Vec<CourseRef>,
    pub current_course: Option<String>,
    pub passed_only: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuizDraftResponse {
    pub data: Option<serde_json::Value>,
    pub updated_at: Option<DateTime<Utc>>,
}
