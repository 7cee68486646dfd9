use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    AttemptFilter, CourseFilter, EnrollmentFilter, LmsStore, StoreError, StoreResult, UserFilter,
};
use crate::models::course::{Course, Enrollment};
use crate::models::lesson::{Lesson, LessonProgress};
use crate::models::newsletter::NewsletterSubscriber;
use crate::models::quiz::{Question, Quiz, QuizAttempt, QuizDraft};
use crate::models::user::{Profile, User};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    profiles: Vec<Profile>,
    courses: Vec<Course>,
    enrollments: Vec<Enrollment>,
    lessons: Vec<Lesson>,
    progress: Vec<LessonProgress>,
    quizzes: Vec<Quiz>,
    questions: Vec<Question>,
    attempts: Vec<QuizAttempt>,
    drafts: Vec<QuizDraft>,
    newsletter: Vec<NewsletterSubscriber>,
}

/// In-process store with the same unique constraints as the Mongo indexes.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn course_matches(course: &Course, filter: &CourseFilter) -> bool {
    filter.active.is_none_or(|active| course.is_active == active)
        && filter
            .instructor
            .is_none_or(|instructor| course.instructor_id == instructor)
        && filter.level.is_none_or(|level| course.level == level)
        && filter.text.as_deref().is_none_or(|text| {
            contains_ci(&course.title, text) || contains_ci(&course.description, text)
        })
        && filter
            .title
            .as_deref()
            .is_none_or(|title| contains_ci(&course.title, title))
}

/// Newest first; among equal timestamps the later insert wins, matching the
/// `_id` tiebreak used by the Mongo queries.
fn newest_first<T: Clone, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut sorted: Vec<T> = items.iter().rev().cloned().collect();
    sorted.sort_by(|a, b| key(b).cmp(&key(a)));
    sorted
}

fn count_by_course<T>(
    rows: &[T],
    course_of: impl Fn(&T) -> ObjectId,
    course_ids: &[ObjectId],
) -> HashMap<ObjectId, u64> {
    let mut counts = HashMap::new();
    for row in rows {
        let course = course_of(row);
        if course_ids.contains(&course) {
            *counts.entry(course).or_insert(0) += 1;
        }
    }
    counts
}

fn order_taken(lessons: &[Lesson], course_id: ObjectId, order: u32, except: ObjectId) -> bool {
    lessons
        .iter()
        .any(|l| l.course_id == course_id && l.order == order && l.id != except)
}

#[async_trait]
impl LmsStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: ObjectId) -> StoreResult<()> {
        self.tables.write().await.users.retain(|u| u.id != id);
        Ok(())
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            return Err(StoreError::Duplicate("email"));
        }
        if let Some(existing) = tables.users.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
        }
        Ok(())
    }

    async fn count_users(&self, filter: &UserFilter) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| filter.role.is_none_or(|role| u.role == role))
            .filter(|u| !filter.active_only || u.is_active)
            .count() as u64)
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.profiles.iter().any(|p| p.user_id == profile.user_id) {
            return Err(StoreError::Duplicate("profile"));
        }
        tables.profiles.push(profile.clone());
        Ok(())
    }

    async fn find_profile(&self, user_id: ObjectId) -> StoreResult<Option<Profile>> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.profiles.iter_mut().find(|p| p.id == profile.id) {
            *existing = profile.clone();
        }
        Ok(())
    }

    async fn insert_course(&self, course: &Course) -> StoreResult<()> {
        self.tables.write().await.courses.push(course.clone());
        Ok(())
    }

    async fn find_course(&self, id: ObjectId) -> StoreResult<Option<Course>> {
        let tables = self.tables.read().await;
        Ok(tables.courses.iter().find(|c| c.id == id).cloned())
    }

    async fn update_course(&self, course: &Course) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.courses.iter_mut().find(|c| c.id == course.id) {
            *existing = course.clone();
        }
        Ok(())
    }

    async fn list_courses(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>> {
        let tables = self.tables.read().await;
        let matching: Vec<Course> = tables
            .courses
            .iter()
            .filter(|c| course_matches(c, filter))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |c| c.created_at))
    }

    async fn count_courses(&self, filter: &CourseFilter) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .courses
            .iter()
            .filter(|c| course_matches(c, filter))
            .count() as u64)
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .enrollments
            .iter()
            .any(|e| e.student_id == enrollment.student_id && e.course_id == enrollment.course_id)
        {
            return Err(StoreError::Duplicate("enrollment"));
        }
        tables.enrollments.push(enrollment.clone());
        Ok(())
    }

    async fn find_enrollment(
        &self,
        student: ObjectId,
        course: ObjectId,
    ) -> StoreResult<Option<Enrollment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .iter()
            .find(|e| e.student_id == student && e.course_id == course)
            .cloned())
    }

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> StoreResult<Vec<Enrollment>> {
        let tables = self.tables.read().await;
        let matching: Vec<Enrollment> = tables
            .enrollments
            .iter()
            .filter(|e| filter.student.is_none_or(|s| e.student_id == s))
            .filter(|e| {
                filter
                    .courses
                    .as_ref()
                    .is_none_or(|courses| courses.contains(&e.course_id))
            })
            .filter(|e| filter.is_completed.is_none_or(|done| e.is_completed == done))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |e| e.enrolled_at))
    }

    async fn update_enrollment_progress(
        &self,
        id: ObjectId,
        progress: u32,
        is_completed: bool,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(enrollment) = tables.enrollments.iter_mut().find(|e| e.id == id) {
            enrollment.progress = progress;
            enrollment.is_completed = is_completed;
        }
        Ok(())
    }

    async fn count_enrollments_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        let tables = self.tables.read().await;
        Ok(count_by_course(&tables.enrollments, |e| e.course_id, course_ids))
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if order_taken(&tables.lessons, lesson.course_id, lesson.order, lesson.id) {
            return Err(StoreError::Duplicate("order"));
        }
        tables.lessons.push(lesson.clone());
        Ok(())
    }

    async fn find_lesson(&self, id: ObjectId) -> StoreResult<Option<Lesson>> {
        let tables = self.tables.read().await;
        Ok(tables.lessons.iter().find(|l| l.id == id).cloned())
    }

    async fn update_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if order_taken(&tables.lessons, lesson.course_id, lesson.order, lesson.id) {
            return Err(StoreError::Duplicate("order"));
        }
        if let Some(existing) = tables.lessons.iter_mut().find(|l| l.id == lesson.id) {
            *existing = lesson.clone();
        }
        Ok(())
    }

    async fn delete_lesson(&self, id: ObjectId) -> StoreResult<()> {
        self.tables.write().await.lessons.retain(|l| l.id != id);
        Ok(())
    }

    async fn list_lessons(&self, course_id: ObjectId) -> StoreResult<Vec<Lesson>> {
        let tables = self.tables.read().await;
        let mut lessons: Vec<Lesson> = tables
            .lessons
            .iter()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.order);
        Ok(lessons)
    }

    async fn search_lessons(&self, title: &str) -> StoreResult<Vec<Lesson>> {
        let tables = self.tables.read().await;
        let mut lessons: Vec<Lesson> = tables
            .lessons
            .iter()
            .filter(|l| contains_ci(&l.title, title))
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.course_id, l.order));
        Ok(lessons)
    }

    async fn count_lessons(&self) -> StoreResult<u64> {
        Ok(self.tables.read().await.lessons.len() as u64)
    }

    async fn count_lessons_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        let tables = self.tables.read().await;
        Ok(count_by_course(&tables.lessons, |l| l.course_id, course_ids))
    }

    async fn reorder_lessons(
        &self,
        course_id: ObjectId,
        orders: &[(ObjectId, u32)],
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let mut updated: Vec<Lesson> = tables
            .lessons
            .iter()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();

        for (lesson_id, order) in orders {
            if let Some(lesson) = updated.iter_mut().find(|l| l.id == *lesson_id) {
                lesson.order = *order;
            }
        }

        let mut seen = std::collections::HashSet::new();
        if !updated.iter().all(|l| seen.insert(l.order)) {
            return Err(StoreError::Duplicate("order"));
        }

        for lesson in updated {
            if let Some(existing) = tables.lessons.iter_mut().find(|l| l.id == lesson.id) {
                existing.order = lesson.order;
            }
        }
        Ok(())
    }

    async fn find_progress(
        &self,
        student: ObjectId,
        lesson: ObjectId,
    ) -> StoreResult<Option<LessonProgress>> {
        let tables = self.tables.read().await;
        Ok(tables
            .progress
            .iter()
            .find(|p| p.student_id == student && p.lesson_id == lesson)
            .cloned())
    }

    async fn save_progress(&self, progress: &LessonProgress) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables
            .progress
            .iter_mut()
            .find(|p| p.student_id == progress.student_id && p.lesson_id == progress.lesson_id)
        {
            Some(existing) => *existing = progress.clone(),
            None => tables.progress.push(progress.clone()),
        }
        Ok(())
    }

    async fn delete_progress(&self, student: ObjectId, lesson: ObjectId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.progress.len();
        tables
            .progress
            .retain(|p| !(p.student_id == student && p.lesson_id == lesson));
        Ok(tables.progress.len() != before)
    }

    async fn list_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<Vec<LessonProgress>> {
        let tables = self.tables.read().await;
        Ok(tables
            .progress
            .iter()
            .filter(|p| p.student_id == student)
            .filter(|p| course.is_none_or(|c| p.course_id == c))
            .cloned()
            .collect())
    }

    async fn count_completed_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .progress
            .iter()
            .filter(|p| p.student_id == student && p.is_completed)
            .filter(|p| course.is_none_or(|c| p.course_id == c))
            .count() as u64)
    }

    async fn delete_progress_for_lesson(&self, lesson: ObjectId) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.progress.len();
        tables.progress.retain(|p| p.lesson_id != lesson);
        Ok((before - tables.progress.len()) as u64)
    }

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        self.tables.write().await.quizzes.push(quiz.clone());
        Ok(())
    }

    async fn find_quiz(&self, id: ObjectId) -> StoreResult<Option<Quiz>> {
        let tables = self.tables.read().await;
        Ok(tables.quizzes.iter().find(|q| q.id == id).cloned())
    }

    async fn find_quizzes(&self, ids: &[ObjectId]) -> StoreResult<Vec<Quiz>> {
        let tables = self.tables.read().await;
        Ok(tables
            .quizzes
            .iter()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn list_quizzes(&self, lesson_id: ObjectId) -> StoreResult<Vec<Quiz>> {
        let tables = self.tables.read().await;
        Ok(tables
            .quizzes
            .iter()
            .filter(|q| q.lesson_id == lesson_id)
            .cloned()
            .collect())
    }

    async fn delete_quiz(&self, id: ObjectId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.questions.retain(|q| q.quiz_id != id);
        tables.attempts.retain(|a| a.quiz_id != id);
        tables.drafts.retain(|d| d.quiz_id != id);
        tables.quizzes.retain(|q| q.id != id);
        Ok(())
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        self.tables.write().await.questions.push(question.clone());
        Ok(())
    }

    async fn find_question(&self, id: ObjectId) -> StoreResult<Option<Question>> {
        let tables = self.tables.read().await;
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn list_questions(&self, quiz_id: ObjectId) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        let mut questions: Vec<Question> = tables
            .questions
            .iter()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }

    async fn delete_question(&self, id: ObjectId) -> StoreResult<()> {
        self.tables.write().await.questions.retain(|q| q.id != id);
        Ok(())
    }

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.tables.write().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn find_attempt(&self, id: ObjectId) -> StoreResult<Option<QuizAttempt>> {
        let tables = self.tables.read().await;
        Ok(tables.attempts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_attempts(&self, filter: &AttemptFilter) -> StoreResult<Vec<QuizAttempt>> {
        let tables = self.tables.read().await;
        let matching: Vec<QuizAttempt> = tables
            .attempts
            .iter()
            .filter(|a| filter.student.is_none_or(|s| a.student_id == s))
            .filter(|a| filter.quiz.is_none_or(|q| a.quiz_id == q))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |a| a.started_at))
    }

    async fn save_draft(&self, draft: &QuizDraft) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables
            .drafts
            .iter_mut()
            .find(|d| d.student_id == draft.student_id && d.quiz_id == draft.quiz_id)
        {
            Some(existing) => *existing = draft.clone(),
            None => tables.drafts.push(draft.clone()),
        }
        Ok(())
    }

    async fn find_draft(
        &self,
        student: ObjectId,
        quiz: ObjectId,
    ) -> StoreResult<Option<QuizDraft>> {
        let tables = self.tables.read().await;
        Ok(tables
            .drafts
            .iter()
            .find(|d| d.student_id == student && d.quiz_id == quiz)
            .cloned())
    }

    async fn find_subscriber(&self, email: &str) -> StoreResult<Option<NewsletterSubscriber>> {
        let tables = self.tables.read().await;
        Ok(tables
            .newsletter
            .iter()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn insert_subscriber(&self, subscriber: &NewsletterSubscriber) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.newsletter.iter().any(|s| s.email == subscriber.email) {
            return Err(StoreError::Duplicate("email"));
        }
        tables.newsletter.push(subscriber.clone());
        Ok(())
    }

    async fn set_subscriber_active(&self, id: ObjectId, is_active: bool) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(subscriber) = tables.newsletter.iter_mut().find(|s| s.id == id) {
            subscriber.is_active = is_active;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use chrono::Utc;

    fn lesson(course_id: ObjectId, order: u32) -> Lesson {
        Lesson {
            id: ObjectId::new(),
            course_id,
            title: format!("Lesson {}", order),
            description: String::new(),
            video_url: String::new(),
            content: String::new(),
            order,
            duration_minutes: 10,
            is_free: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let user = User {
            id: ObjectId::new(),
            email: "dup@example.com".to_string(),
            password_hash: String::new(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            phone: String::new(),
            birth_date: None,
            role: UserRole::Student,
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        store.insert_user(&user).await.unwrap();

        let mut clone = user.clone();
        clone.id = ObjectId::new();
        let err = store.insert_user(&clone).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("email")));
    }

    #[tokio::test]
    async fn lesson_order_is_unique_per_course() {
        let store = MemoryStore::new();
        let course = ObjectId::new();
        store.insert_lesson(&lesson(course, 1)).await.unwrap();
        assert!(matches!(
            store.insert_lesson(&lesson(course, 1)).await,
            Err(StoreError::Duplicate("order"))
        ));
        store.insert_lesson(&lesson(ObjectId::new(), 1)).await.unwrap();
    }

    #[tokio::test]
    async fn reorder_swaps_and_rejects_collisions() {
        let store = MemoryStore::new();
        let course = ObjectId::new();
        let first = lesson(course, 1);
        let second = lesson(course, 2);
        let third = lesson(course, 3);
        for l in [&first, &second, &third] {
            store.insert_lesson(l).await.unwrap();
        }

        store
            .reorder_lessons(course, &[(second.id, 1), (first.id, 2)])
            .await
            .unwrap();
        let orders: Vec<ObjectId> = store
            .list_lessons(course)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(orders, vec![second.id, first.id, third.id]);

        let collision = store.reorder_lessons(course, &[(first.id, 3)]).await;
        assert!(matches!(collision, Err(StoreError::Duplicate("order"))));
        assert_eq!(store.find_lesson(first.id).await.unwrap().unwrap().order, 2);
    }
}
