//! Persistence boundary.
//!
//! Services talk to an [`LmsStore`]; production uses [`MongoStore`], tests and
//! local runs without a database use [`MemoryStore`]. Both enforce the same
//! uniqueness rules and report violations as [`StoreError::Duplicate`].

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;

use crate::models::course::{Course, CourseLevel, Enrollment};
use crate::models::lesson::{Lesson, LessonProgress};
use crate::models::newsletter::NewsletterSubscriber;
use crate::models::quiz::{Question, Quiz, QuizAttempt, QuizDraft};
use crate::models::user::{Profile, User, UserRole};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique index rejected the write; the payload names the field.
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("malformed document: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub active_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub active: Option<bool>,
    pub instructor: Option<ObjectId>,
    pub level: Option<CourseLevel>,
    /// Case-insensitive match on title or description.
    pub text: Option<String>,
    /// Case-insensitive match on title only.
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentFilter {
    pub student: Option<ObjectId>,
    pub courses: Option<Vec<ObjectId>>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub student: Option<ObjectId>,
    pub quiz: Option<ObjectId>,
}

/// Listing methods return newest first unless they say otherwise.
#[async_trait]
pub trait LmsStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // users / profiles
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn delete_user(&self, id: ObjectId) -> StoreResult<()>;
    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>>;
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    async fn count_users(&self, filter: &UserFilter) -> StoreResult<u64>;

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()>;
    async fn find_profile(&self, user_id: ObjectId) -> StoreResult<Option<Profile>>;
    async fn update_profile(&self, profile: &Profile) -> StoreResult<()>;

    // courses / enrollments
    async fn insert_course(&self, course: &Course) -> StoreResult<()>;
    async fn find_course(&self, id: ObjectId) -> StoreResult<Option<Course>>;
    async fn update_course(&self, course: &Course) -> StoreResult<()>;
    async fn list_courses(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>>;
    async fn count_courses(&self, filter: &CourseFilter) -> StoreResult<u64>;

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;
    async fn find_enrollment(
        &self,
        student: ObjectId,
        course: ObjectId,
    ) -> StoreResult<Option<Enrollment>>;
    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> StoreResult<Vec<Enrollment>>;
    async fn update_enrollment_progress(
        &self,
        id: ObjectId,
        progress: u32,
        is_completed: bool,
    ) -> StoreResult<()>;
    async fn count_enrollments_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>>;

    // lessons
    async fn insert_lesson(&self, lesson: &Lesson) -> StoreResult<()>;
    async fn find_lesson(&self, id: ObjectId) -> StoreResult<Option<Lesson>>;
    async fn update_lesson(&self, lesson: &Lesson) -> StoreResult<()>;
    async fn delete_lesson(&self, id: ObjectId) -> StoreResult<()>;
    /// Ordered by `order` ascending.
    async fn list_lessons(&self, course_id: ObjectId) -> StoreResult<Vec<Lesson>>;
    /// Case-insensitive title match across all courses.
    async fn search_lessons(&self, title: &str) -> StoreResult<Vec<Lesson>>;
    async fn count_lessons(&self) -> StoreResult<u64>;
    async fn count_lessons_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>>;
    /// Assigns the given orders within one course. Lessons of other courses
    /// are left untouched; a collision leaves the previous orders in place.
    async fn reorder_lessons(
        &self,
        course_id: ObjectId,
        orders: &[(ObjectId, u32)],
    ) -> StoreResult<()>;

    // lesson progress
    async fn find_progress(
        &self,
        student: ObjectId,
        lesson: ObjectId,
    ) -> StoreResult<Option<LessonProgress>>;
    /// Upsert keyed by `(student_id, lesson_id)`.
    async fn save_progress(&self, progress: &LessonProgress) -> StoreResult<()>;
    /// Returns whether a record existed.
    async fn delete_progress(&self, student: ObjectId, lesson: ObjectId) -> StoreResult<bool>;
    async fn list_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<Vec<LessonProgress>>;
    async fn count_completed_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<u64>;
    async fn delete_progress_for_lesson(&self, lesson: ObjectId) -> StoreResult<u64>;

    // quizzes
    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()>;
    async fn find_quiz(&self, id: ObjectId) -> StoreResult<Option<Quiz>>;
    async fn find_quizzes(&self, ids: &[ObjectId]) -> StoreResult<Vec<Quiz>>;
    async fn list_quizzes(&self, lesson_id: ObjectId) -> StoreResult<Vec<Quiz>>;
    /// Removes the quiz with its questions, attempts and drafts.
    async fn delete_quiz(&self, id: ObjectId) -> StoreResult<()>;

    async fn insert_question(&self, question: &Question) -> StoreResult<()>;
    async fn find_question(&self, id: ObjectId) -> StoreResult<Option<Question>>;
    /// Ordered by `order` ascending.
    async fn list_questions(&self, quiz_id: ObjectId) -> StoreResult<Vec<Question>>;
    async fn delete_question(&self, id: ObjectId) -> StoreResult<()>;

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> StoreResult<()>;
    async fn find_attempt(&self, id: ObjectId) -> StoreResult<Option<QuizAttempt>>;
    async fn list_attempts(&self, filter: &AttemptFilter) -> StoreResult<Vec<QuizAttempt>>;

    /// Upsert keyed by `(student_id, quiz_id)`.
    async fn save_draft(&self, draft: &QuizDraft) -> StoreResult<()>;
    async fn find_draft(&self, student: ObjectId, quiz: ObjectId)
        -> StoreResult<Option<QuizDraft>>;

    // newsletter
    async fn find_subscriber(&self, email: &str) -> StoreResult<Option<NewsletterSubscriber>>;
    async fn insert_subscriber(&self, subscriber: &NewsletterSubscriber) -> StoreResult<()>;
    async fn set_subscriber_active(&self, id: ObjectId, is_active: bool) -> StoreResult<()>;
}
