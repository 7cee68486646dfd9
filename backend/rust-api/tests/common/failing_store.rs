use async_trait::async_trait;
use learnhub_api::{
    models::{
        course::{Course, Enrollment},
        lesson::{Lesson, LessonProgress},
        newsletter::NewsletterSubscriber,
        quiz::{Question, Quiz, QuizAttempt, QuizDraft},
        user::{Profile, User},
    },
    store::{
        AttemptFilter, CourseFilter, EnrollmentFilter, LmsStore, MemoryStore, StoreError,
        StoreResult, UserFilter,
    },
};
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;

/// [`MemoryStore`] with selected writes forced to fail.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    /// `insert_profile` reports a database failure.
    pub fail_profile_insert: bool,
    /// `save_progress` reports a unique-index violation, as a lost upsert race would.
    pub duplicate_progress: bool,
}

#[async_trait]
impl LmsStore for FailingStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.inner.insert_user(user).await
    }

    async fn delete_user(&self, id: ObjectId) -> StoreResult<()> {
        self.inner.delete_user(id).await
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        self.inner.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>> {
        self.inner.find_users(ids).await
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        self.inner.update_user(user).await
    }

    async fn count_users(&self, filter: &UserFilter) -> StoreResult<u64> {
        self.inner.count_users(filter).await
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()> {
        if self.fail_profile_insert {
            return Err(StoreError::Malformed("profiles collection unavailable".to_string()));
        }
        self.inner.insert_profile(profile).await
    }

    async fn find_profile(&self, user_id: ObjectId) -> StoreResult<Option<Profile>> {
        self.inner.find_profile(user_id).await
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.inner.update_profile(profile).await
    }

    async fn insert_course(&self, course: &Course) -> StoreResult<()> {
        self.inner.insert_course(course).await
    }

    async fn find_course(&self, id: ObjectId) -> StoreResult<Option<Course>> {
        self.inner.find_course(id).await
    }

    async fn update_course(&self, course: &Course) -> StoreResult<()> {
        self.inner.update_course(course).await
    }

    async fn list_courses(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>> {
        self.inner.list_courses(filter).await
    }

    async fn count_courses(&self, filter: &CourseFilter) -> StoreResult<u64> {
        self.inner.count_courses(filter).await
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        self.inner.insert_enrollment(enrollment).await
    }

    async fn find_enrollment(
        &self,
        student: ObjectId,
        course: ObjectId,
    ) -> StoreResult<Option<Enrollment>> {
        self.inner.find_enrollment(student, course).await
    }

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> StoreResult<Vec<Enrollment>> {
        self.inner.list_enrollments(filter).await
    }

    async fn update_enrollment_progress(
        &self,
        id: ObjectId,
        progress: u32,
        is_completed: bool,
    ) -> StoreResult<()> {
        self.inner
            .update_enrollment_progress(id, progress, is_completed)
            .await
    }

    async fn count_enrollments_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        self.inner.count_enrollments_by_course(course_ids).await
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        self.inner.insert_lesson(lesson).await
    }

    async fn find_lesson(&self, id: ObjectId) -> StoreResult<Option<Lesson>> {
        self.inner.find_lesson(id).await
    }

    async fn update_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        self.inner.update_lesson(lesson).await
    }

    async fn delete_lesson(&self, id: ObjectId) -> StoreResult<()> {
        self.inner.delete_lesson(id).await
    }

    async fn list_lessons(&self, course_id: ObjectId) -> StoreResult<Vec<Lesson>> {
        self.inner.list_lessons(course_id).await
    }

    async fn search_lessons(&self, title: &str) -> StoreResult<Vec<Lesson>> {
        self.inner.search_lessons(title).await
    }

    async fn count_lessons(&self) -> StoreResult<u64> {
        self.inner.count_lessons().await
    }

    async fn count_lessons_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        self.inner.count_lessons_by_course(course_ids).await
    }

    async fn reorder_lessons(
        &self,
        course_id: ObjectId,
        orders: &[(ObjectId, u32)],
    ) -> StoreResult<()> {
        self.inner.reorder_lessons(course_id, orders).await
    }

    async fn find_progress(
        &self,
        student: ObjectId,
        lesson: ObjectId,
    ) -> StoreResult<Option<LessonProgress>> {
        self.inner.find_progress(student, lesson).await
    }

    async fn save_progress(&self, progress: &LessonProgress) -> StoreResult<()> {
        if self.duplicate_progress {
            return Err(StoreError::Duplicate("lesson"));
        }
        self.inner.save_progress(progress).await
    }

    async fn delete_progress(&self, student: ObjectId, lesson: ObjectId) -> StoreResult<bool> {
        self.inner.delete_progress(student, lesson).await
    }

    async fn list_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<Vec<LessonProgress>> {
        self.inner.list_progress(student, course).await
    }

    async fn count_completed_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<u64> {
        self.inner.count_completed_progress(student, course).await
    }

    async fn delete_progress_for_lesson(&self, lesson: ObjectId) -> StoreResult<u64> {
        self.inner.delete_progress_for_lesson(lesson).await
    }

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        self.inner.insert_quiz(quiz).await
    }

    async fn find_quiz(&self, id: ObjectId) -> StoreResult<Option<Quiz>> {
        self.inner.find_quiz(id).await
    }

    async fn find_quizzes(&self, ids: &[ObjectId]) -> StoreResult<Vec<Quiz>> {
        self.inner.find_quizzes(ids).await
    }

    async fn list_quizzes(&self, lesson_id: ObjectId) -> StoreResult<Vec<Quiz>> {
        self.inner.list_quizzes(lesson_id).await
    }

    async fn delete_quiz(&self, id: ObjectId) -> StoreResult<()> {
        self.inner.delete_quiz(id).await
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        self.inner.insert_question(question).await
    }

    async fn find_question(&self, id: ObjectId) -> StoreResult<Option<Question>> {
        self.inner.find_question(id).await
    }

    async fn list_questions(&self, quiz_id: ObjectId) -> StoreResult<Vec<Question>> {
        self.inner.list_questions(quiz_id).await
    }

    async fn delete_question(&self, id: ObjectId) -> StoreResult<()> {
        self.inner.delete_question(id).await
    }

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.inner.insert_attempt(attempt).await
    }

    async fn find_attempt(&self, id: ObjectId) -> StoreResult<Option<QuizAttempt>> {
        self.inner.find_attempt(id).await
    }

    async fn list_attempts(&self, filter: &AttemptFilter) -> StoreResult<Vec<QuizAttempt>> {
        self.inner.list_attempts(filter).await
    }

    async fn save_draft(&self, draft: &QuizDraft) -> StoreResult<()> {
        self.inner.save_draft(draft).await
    }

    async fn find_draft(
        &self,
        student: ObjectId,
        quiz: ObjectId,
    ) -> StoreResult<Option<QuizDraft>> {
        self.inner.find_draft(student, quiz).await
    }

    async fn find_subscriber(&self, email: &str) -> StoreResult<Option<NewsletterSubscriber>> {
        self.inner.find_subscriber(email).await
    }

    async fn insert_subscriber(&self, subscriber: &NewsletterSubscriber) -> StoreResult<()> {
        self.inner.insert_subscriber(subscriber).await
    }

    async fn set_subscriber_active(&self, id: ObjectId, is_active: bool) -> StoreResult<()> {
        self.inner.set_subscriber_active(id, is_active).await
    }
}
