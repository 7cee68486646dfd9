use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::course::CourseCard;
use super::lesson::{CourseRef, LessonSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterSubscriber {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Stored trimmed and lowercased; unique.
    pub email: String,
    pub is_active: bool,
    #[serde(rename = "subscribedAt", with = "bson_datetime_as_chrono")]
    pub subscribed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[serde(default)]
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HomeStats {
    pub total_courses: u64,
    pub total_students: u64,
    pub total_teachers: u64,
    pub total_lessons: u64,
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub featured_courses: Vec<CourseCard>,
    pub stats: HomeStats,
}

#[derive(Debug, Serialize)]
pub struct LessonHit {
    #[serde(flatten)]
    pub lesson: LessonSummary,
    pub course: CourseRef,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub courses: Vec<CourseCard>,
    pub lessons: Vec<LessonHit>,
    pub total_results: u64,
}
