use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::lesson::LessonSummary;
use super::user::UserSummary;

/// Course document in the "courses" collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub instructor_id: ObjectId,
    pub level: CourseLevel,
    pub duration_weeks: u32,
    #[serde(default)]
    pub price: f64,
    /// Soft delete flag; inactive courses disappear from the catalog.
    pub is_active: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    pub const ALL: [CourseLevel; 3] = [
        CourseLevel::Beginner,
        CourseLevel::Intermediate,
        CourseLevel::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CourseLevel::Beginner => "Beginner",
            CourseLevel::Intermediate => "Intermediate",
            CourseLevel::Advanced => "Advanced",
        }
    }
}

impl FromStr for CourseLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(CourseLevel::Beginner),
            "intermediate" => Ok(CourseLevel::Intermediate),
            "advanced" => Ok(CourseLevel::Advanced),
            other => Err(format!("Unknown course level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelChoice {
    pub value: CourseLevel,
    pub label: &'static str,
}

impl From<CourseLevel> for LevelChoice {
    fn from(level: CourseLevel) -> Self {
        LevelChoice {
            value: level,
            label: level.label(),
        }
    }
}

/// A student's enrollment in a course. `(student_id, course_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: ObjectId,
    pub course_id: ObjectId,
    #[serde(rename = "enrolledAt", with = "bson_datetime_as_chrono")]
    pub enrolled_at: DateTime<Utc>,
    /// Percentage of the course's lessons completed, 0-100.
    pub progress: u32,
    pub is_completed: bool,
}

impl Enrollment {
    pub fn new(student_id: ObjectId, course_id: ObjectId) -> Self {
        Self {
            id: ObjectId::new(),
            student_id,
            course_id,
            enrolled_at: Utc::now(),
            progress: 0,
            is_completed: false,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 10, max = 200, message = "Title must be 10-200 characters"))]
    pub title: String,

    #[validate(length(min = 50, message = "Description must be at least 50 characters"))]
    pub description: String,

    pub level: CourseLevel,

    #[validate(range(min = 1, max = 52, message = "Duration must be between 1 and 52 weeks"))]
    pub duration_weeks: u32,

    #[serde(default)]
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 10, max = 200, message = "Title must be 10-200 characters"))]
    pub title: String,

    #[validate(length(min = 50, message = "Description must be at least 50 characters"))]
    pub description: String,

    pub level: CourseLevel,

    #[validate(range(min = 1, max = 52, message = "Duration must be between 1 and 52 weeks"))]
    pub duration_weeks: u32,

    #[serde(default)]
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,

    pub is_active: Option<bool>,
}

/// Query string of the course catalog.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub query: Option<String>,
    pub level: Option<String>,
    pub instructor: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSort {
    #[default]
    Newest,
    Popular,
    Alphabetical,
    PriceLow,
    PriceHigh,
}

impl CatalogSort {
    /// Unknown values fall back to `Newest`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("popular") => CatalogSort::Popular,
            Some("alphabetical") => CatalogSort::Alphabetical,
            Some("price_low") => CatalogSort::PriceLow,
            Some("price_high") => CatalogSort::PriceHigh,
            _ => CatalogSort::Newest,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
    pub page: Option<String>,
}

/// Course as shown in listings, with its aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct CourseCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: CourseLevel,
    pub level_label: &'static str,
    pub duration_weeks: u32,
    pub price: f64,
    pub is_active: bool,
    pub instructor: Option<UserSummary>,
    pub student_count: u64,
    pub lesson_count: u64,
    pub created_at: DateTime<Utc>,
}

impl CourseCard {
    pub fn new(
        course: &Course,
        instructor: Option<UserSummary>,
        student_count: u64,
        lesson_count: u64,
    ) -> Self {
        CourseCard {
            id: course.id.to_hex(),
            title: course.title.clone(),
            description: course.description.clone(),
            level: course.level,
            level_label: course.level.label(),
            duration_weeks: course.duration_weeks,
            price: course.price,
            is_active: course.is_active,
            instructor,
            student_count,
            lesson_count,
            created_at: course.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentView {
    pub id: String,
    pub course_id: String,
    pub enrolled_at: DateTime<Utc>,
    pub progress: u32,
    pub is_completed: bool,
}

impl From<&Enrollment> for EnrollmentView {
    fn from(enrollment: &Enrollment) -> Self {
        EnrollmentView {
            id: enrollment.id.to_hex(),
            course_id: enrollment.course_id.to_hex(),
            enrolled_at: enrollment.enrolled_at,
            progress: enrollment.progress,
            is_completed: enrollment.is_completed,
        }
    }
}

/// Enrollment row on the student's "my courses" page.
#[derive(Debug, Serialize)]
pub struct EnrolledCourse {
    pub enrollment: EnrollmentView,
    pub course: CourseCard,
}

#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub total_courses: u64,
    pub total_instructors: u64,
    pub levels: Vec<LevelChoice>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub courses: super::Page<CourseCard>,
    pub stats: CatalogStats,
    pub current_sort: CatalogSort,
}

#[derive(Debug, Serialize)]
pub struct CourseDetailResponse {
    pub course: CourseCard,
    pub lessons: Vec<LessonSummary>,
    pub is_enrolled: bool,
    pub enrollment: Option<EnrollmentView>,
    pub total_students: u64,
    pub total_lessons: u64,
    pub total_duration: u64,
    pub instructor_other_courses: Vec<CourseCard>,
}

#[derive(Debug, Serialize)]
pub struct InstructorStats {
    pub total_courses: u64,
    pub active_courses: u64,
    pub total_students: u64,
}

#[derive(Debug, Serialize)]
pub struct InstructorCoursesResponse {
    pub courses: super::Page<CourseCard>,
    pub stats: InstructorStats,
    pub current_status: String,
}

#[derive(Debug, Serialize)]
pub struct StudentCoursesResponse {
    pub enrollments: super::Page<EnrolledCourse>,
    pub current_status: String,
}

/// "My courses" answers differently per role.
#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum MyCoursesResponse {
    Student(StudentCoursesResponse),
    Instructor(InstructorCoursesResponse),
}

#[derive(Debug, Serialize)]
pub struct LevelCoursesResponse {
    pub level: CourseLevel,
    pub level_display: &'static str,
    pub courses: super::Page<CourseCard>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_sort_defaults_to_newest() {
        assert_eq!(CatalogSort::parse(None), CatalogSort::Newest);
        assert_eq!(CatalogSort::parse(Some("bogus")), CatalogSort::Newest);
        assert_eq!(CatalogSort::parse(Some("price_high")), CatalogSort::PriceHigh);
    }

    #[test]
    fn course_level_parses_known_values_only() {
        assert_eq!("advanced".parse::<CourseLevel>().unwrap(), CourseLevel::Advanced);
        assert!("expert".parse::<CourseLevel>().is_err());
    }

    #[test]
    fn create_request_enforces_lengths() {
        let req = CreateCourseRequest {
            title: "Short".to_string(),
            description: "Too short".to_string(),
            level: CourseLevel::Beginner,
            duration_weeks: 60,
            price: -1.0,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["title", "description", "duration_weeks", "price"] {
            assert!(fields.contains_key(field), "missing error for {}", field);
        }
    }
}
