use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use std::collections::HashMap;
use std::future::IntoFuture;

use super::{
    AttemptFilter, CourseFilter, EnrollmentFilter, LmsStore, StoreError, StoreResult, UserFilter,
};
use crate::metrics::track_db_operation;
use crate::models::course::{Course, Enrollment};
use crate::models::lesson::{Lesson, LessonProgress};
use crate::models::newsletter::NewsletterSubscriber;
use crate::models::quiz::{Question, Quiz, QuizAttempt, QuizDraft};
use crate::models::user::{Profile, User};

const USERS: &str = "users";
const PROFILES: &str = "profiles";
const COURSES: &str = "courses";
const ENROLLMENTS: &str = "enrollments";
const LESSONS: &str = "lessons";
const LESSON_PROGRESS: &str = "lesson_progress";
const QUIZZES: &str = "quizzes";
const QUESTIONS: &str = "questions";
const QUIZ_ATTEMPTS: &str = "quiz_attempts";
const QUIZ_DRAFTS: &str = "quiz_drafts";
const NEWSLETTER: &str = "newsletter";

/// Reordering first parks lessons on orders far above any real one so that
/// swapping two lessons never trips the `(course_id, order)` index.
const REORDER_PARKING_OFFSET: u32 = 1_000_000;

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the unique indexes the services rely on for duplicate detection.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique_indexes: [(&str, Document); 6] = [
            (USERS, doc! { "email": 1 }),
            (PROFILES, doc! { "user_id": 1 }),
            (ENROLLMENTS, doc! { "student_id": 1, "course_id": 1 }),
            (LESSONS, doc! { "course_id": 1, "order": 1 }),
            (LESSON_PROGRESS, doc! { "student_id": 1, "lesson_id": 1 }),
            (NEWSLETTER, doc! { "email": 1 }),
        ];

        for (collection, keys) in unique_indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.db
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .with_context(|| format!("Failed to create unique index on {}", collection))?;
        }

        let lookup_indexes: [(&str, Document); 4] = [
            (COURSES, doc! { "instructor_id": 1, "is_active": 1 }),
            (LESSON_PROGRESS, doc! { "student_id": 1, "course_id": 1 }),
            (QUIZ_ATTEMPTS, doc! { "student_id": 1, "quiz_id": 1 }),
            (QUIZ_DRAFTS, doc! { "student_id": 1, "quiz_id": 1 }),
        ];

        for (collection, keys) in lookup_indexes {
            let model = IndexModel::builder().keys(keys).build();
            self.db
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .with_context(|| format!("Failed to create index on {}", collection))?;
        }

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn profiles(&self) -> Collection<Profile> {
        self.db.collection(PROFILES)
    }

    fn courses(&self) -> Collection<Course> {
        self.db.collection(COURSES)
    }

    fn enrollments(&self) -> Collection<Enrollment> {
        self.db.collection(ENROLLMENTS)
    }

    fn lessons(&self) -> Collection<Lesson> {
        self.db.collection(LESSONS)
    }

    fn progress(&self) -> Collection<LessonProgress> {
        self.db.collection(LESSON_PROGRESS)
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.db.collection(QUIZZES)
    }

    fn questions(&self) -> Collection<Question> {
        self.db.collection(QUESTIONS)
    }

    fn attempts(&self) -> Collection<QuizAttempt> {
        self.db.collection(QUIZ_ATTEMPTS)
    }

    fn drafts(&self) -> Collection<QuizDraft> {
        self.db.collection(QUIZ_DRAFTS)
    }

    fn newsletter(&self) -> Collection<NewsletterSubscriber> {
        self.db.collection(NEWSLETTER)
    }

    async fn count_grouped(
        &self,
        collection: &'static str,
        key: &str,
        ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut matcher = Document::new();
        matcher.insert(key, doc! { "$in": ids.to_vec() });
        let pipeline = vec![
            doc! { "$match": matcher },
            doc! { "$group": { "_id": format!("${}", key), "count": { "$sum": 1 } } },
        ];

        let coll = self.db.collection::<Document>(collection);
        track_db_operation("aggregate", collection, async {
            let mut cursor = coll.aggregate(pipeline).await?;
            let mut counts = HashMap::new();
            while let Some(row) = cursor.try_next().await? {
                let id = row
                    .get_object_id("_id")
                    .map_err(|e| StoreError::Malformed(e.to_string()))?;
                let count = match row.get("count") {
                    Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
                    Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
                    _ => 0,
                };
                counts.insert(id, count);
            }
            Ok::<_, StoreError>(counts)
        })
        .await
    }

    async fn set_lesson_order(
        &self,
        course_id: ObjectId,
        lesson_id: ObjectId,
        order: u32,
    ) -> StoreResult<()> {
        let coll = self.lessons();
        let update = coll
            .update_one(
                doc! { "_id": lesson_id, "course_id": course_id },
                doc! { "$set": { "order": i64::from(order) } },
            );
        track_db_operation("update_one", LESSONS, async {
            update
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "order"))
        })
        .await
    }

    async fn apply_orders(&self, course_id: ObjectId, orders: &[(ObjectId, u32)]) -> StoreResult<()> {
        for (index, (lesson_id, _)) in orders.iter().enumerate() {
            let parked = REORDER_PARKING_OFFSET + index as u32;
            self.set_lesson_order(course_id, *lesson_id, parked).await?;
        }
        for (lesson_id, order) in orders {
            self.set_lesson_order(course_id, *lesson_id, *order).await?;
        }
        Ok(())
    }
}

/// Runs a driver action under the db metrics.
async fn tracked<T, A>(operation: &str, collection: &str, action: A) -> StoreResult<T>
where
    A: IntoFuture<Output = Result<T, mongodb::error::Error>>,
{
    track_db_operation(operation, collection, action.into_future())
        .await
        .map_err(StoreError::from)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

fn classify_write(err: mongodb::error::Error, field: &'static str) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Duplicate(field)
    } else {
        StoreError::Database(err)
    }
}

fn contains_ci(text: &str) -> Document {
    doc! { "$regex": regex::escape(text), "$options": "i" }
}

fn course_query(filter: &CourseFilter) -> Document {
    let mut query = Document::new();
    if let Some(active) = filter.active {
        query.insert("is_active", active);
    }
    if let Some(instructor) = filter.instructor {
        query.insert("instructor_id", instructor);
    }
    if let Some(level) = filter.level {
        query.insert("level", level.as_str());
    }
    if let Some(text) = &filter.text {
        query.insert(
            "$or",
            vec![
                doc! { "title": contains_ci(text) },
                doc! { "description": contains_ci(text) },
            ],
        );
    }
    if let Some(title) = &filter.title {
        query.insert("title", contains_ci(title));
    }
    query
}

#[async_trait]
impl LmsStore for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        tracked("ping", "admin", self.db.run_command(doc! { "ping": 1 }))
            .await
            .map(|_| ())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        track_db_operation("insert_one", USERS, async {
            self.users()
                .insert_one(user)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "email"))
        })
        .await
    }

    async fn delete_user(&self, id: ObjectId) -> StoreResult<()> {
        tracked("delete_one", USERS, self.users().delete_one(doc! { "_id": id }))
            .await
            .map(|_| ())
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        tracked("find_one", USERS, self.users().find_one(doc! { "_id": id })).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        tracked("find_one", USERS, self.users().find_one(doc! { "email": email })).await
    }

    async fn find_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        tracked("find", USERS, async {
            self.users()
                .find(doc! { "_id": { "$in": ids.to_vec() } })
                .await?
                .try_collect()
                .await
        })
        .await
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        track_db_operation("replace_one", USERS, async {
            self.users()
                .replace_one(doc! { "_id": user.id }, user)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "email"))
        })
        .await
    }

    async fn count_users(&self, filter: &UserFilter) -> StoreResult<u64> {
        let mut query = Document::new();
        if let Some(role) = filter.role {
            query.insert("role", role.as_str());
        }
        if filter.active_only {
            query.insert("is_active", true);
        }
        tracked("count_documents", USERS, self.users().count_documents(query)).await
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()> {
        track_db_operation("insert_one", PROFILES, async {
            self.profiles()
                .insert_one(profile)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "profile"))
        })
        .await
    }

    async fn find_profile(&self, user_id: ObjectId) -> StoreResult<Option<Profile>> {
        tracked(
            "find_one",
            PROFILES,
            self.profiles().find_one(doc! { "user_id": user_id }),
        )
        .await
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<()> {
        tracked(
            "replace_one",
            PROFILES,
            self.profiles().replace_one(doc! { "_id": profile.id }, profile),
        )
        .await
        .map(|_| ())
    }

    async fn insert_course(&self, course: &Course) -> StoreResult<()> {
        tracked("insert_one", COURSES, self.courses().insert_one(course))
            .await
            .map(|_| ())
    }

    async fn find_course(&self, id: ObjectId) -> StoreResult<Option<Course>> {
        tracked("find_one", COURSES, self.courses().find_one(doc! { "_id": id })).await
    }

    async fn update_course(&self, course: &Course) -> StoreResult<()> {
        tracked(
            "replace_one",
            COURSES,
            self.courses().replace_one(doc! { "_id": course.id }, course),
        )
        .await
        .map(|_| ())
    }

    async fn list_courses(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>> {
        let coll = self.courses();
        let find = coll
            .find(course_query(filter))
            .sort(doc! { "createdAt": -1, "_id": -1 });
        tracked("find", COURSES, async { find.await?.try_collect().await }).await
    }

    async fn count_courses(&self, filter: &CourseFilter) -> StoreResult<u64> {
        tracked(
            "count_documents",
            COURSES,
            self.courses().count_documents(course_query(filter)),
        )
        .await
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        track_db_operation("insert_one", ENROLLMENTS, async {
            self.enrollments()
                .insert_one(enrollment)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "enrollment"))
        })
        .await
    }

    async fn find_enrollment(
        &self,
        student: ObjectId,
        course: ObjectId,
    ) -> StoreResult<Option<Enrollment>> {
        tracked(
            "find_one",
            ENROLLMENTS,
            self.enrollments()
                .find_one(doc! { "student_id": student, "course_id": course }),
        )
        .await
    }

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> StoreResult<Vec<Enrollment>> {
        let mut query = Document::new();
        if let Some(student) = filter.student {
            query.insert("student_id", student);
        }
        if let Some(courses) = &filter.courses {
            query.insert("course_id", doc! { "$in": courses.clone() });
        }
        if let Some(is_completed) = filter.is_completed {
            query.insert("is_completed", is_completed);
        }

        let coll = self.enrollments();
        let find = coll
            .find(query)
            .sort(doc! { "enrolledAt": -1, "_id": -1 });
        tracked("find", ENROLLMENTS, async { find.await?.try_collect().await }).await
    }

    async fn update_enrollment_progress(
        &self,
        id: ObjectId,
        progress: u32,
        is_completed: bool,
    ) -> StoreResult<()> {
        tracked(
            "update_one",
            ENROLLMENTS,
            self.enrollments().update_one(
                doc! { "_id": id },
                doc! { "$set": { "progress": i64::from(progress), "is_completed": is_completed } },
            ),
        )
        .await
        .map(|_| ())
    }

    async fn count_enrollments_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        self.count_grouped(ENROLLMENTS, "course_id", course_ids).await
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        track_db_operation("insert_one", LESSONS, async {
            self.lessons()
                .insert_one(lesson)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "order"))
        })
        .await
    }

    async fn find_lesson(&self, id: ObjectId) -> StoreResult<Option<Lesson>> {
        tracked("find_one", LESSONS, self.lessons().find_one(doc! { "_id": id })).await
    }

    async fn update_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        track_db_operation("replace_one", LESSONS, async {
            self.lessons()
                .replace_one(doc! { "_id": lesson.id }, lesson)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "order"))
        })
        .await
    }

    async fn delete_lesson(&self, id: ObjectId) -> StoreResult<()> {
        tracked("delete_one", LESSONS, self.lessons().delete_one(doc! { "_id": id }))
            .await
            .map(|_| ())
    }

    async fn list_lessons(&self, course_id: ObjectId) -> StoreResult<Vec<Lesson>> {
        let coll = self.lessons();
        let find = coll
            .find(doc! { "course_id": course_id })
            .sort(doc! { "order": 1 });
        tracked("find", LESSONS, async { find.await?.try_collect().await }).await
    }

    async fn search_lessons(&self, title: &str) -> StoreResult<Vec<Lesson>> {
        let coll = self.lessons();
        let find = coll
            .find(doc! { "title": contains_ci(title) })
            .sort(doc! { "course_id": 1, "order": 1 });
        tracked("find", LESSONS, async { find.await?.try_collect().await }).await
    }

    async fn count_lessons(&self) -> StoreResult<u64> {
        tracked(
            "count_documents",
            LESSONS,
            self.lessons().count_documents(doc! {}),
        )
        .await
    }

    async fn count_lessons_by_course(
        &self,
        course_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        self.count_grouped(LESSONS, "course_id", course_ids).await
    }

    async fn reorder_lessons(
        &self,
        course_id: ObjectId,
        orders: &[(ObjectId, u32)],
    ) -> StoreResult<()> {
        let previous: HashMap<ObjectId, u32> = self
            .list_lessons(course_id)
            .await?
            .into_iter()
            .map(|lesson| (lesson.id, lesson.order))
            .collect();

        let targets: Vec<(ObjectId, u32)> = orders
            .iter()
            .filter(|(id, _)| previous.contains_key(id))
            .copied()
            .collect();

        if let Err(err) = self.apply_orders(course_id, &targets).await {
            let restore: Vec<(ObjectId, u32)> = previous.iter().map(|(id, o)| (*id, *o)).collect();
            if let Err(restore_err) = self.apply_orders(course_id, &restore).await {
                tracing::error!(
                    course_id = %course_id,
                    error = %restore_err,
                    "Failed to restore lesson order after reorder collision"
                );
            }
            return Err(err);
        }

        Ok(())
    }

    async fn find_progress(
        &self,
        student: ObjectId,
        lesson: ObjectId,
    ) -> StoreResult<Option<LessonProgress>> {
        tracked(
            "find_one",
            LESSON_PROGRESS,
            self.progress()
                .find_one(doc! { "student_id": student, "lesson_id": lesson }),
        )
        .await
    }

    async fn save_progress(&self, progress: &LessonProgress) -> StoreResult<()> {
        // Two concurrent upserts of a new record can both miss and insert
        track_db_operation("replace_one", LESSON_PROGRESS, async {
            self.progress()
                .replace_one(
                    doc! { "student_id": progress.student_id, "lesson_id": progress.lesson_id },
                    progress,
                )
                .upsert(true)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "lesson"))
        })
        .await
    }

    async fn delete_progress(&self, student: ObjectId, lesson: ObjectId) -> StoreResult<bool> {
        tracked(
            "delete_one",
            LESSON_PROGRESS,
            self.progress()
                .delete_one(doc! { "student_id": student, "lesson_id": lesson }),
        )
        .await
        .map(|result| result.deleted_count > 0)
    }

    async fn list_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<Vec<LessonProgress>> {
        let mut query = doc! { "student_id": student };
        if let Some(course) = course {
            query.insert("course_id", course);
        }
        tracked("find", LESSON_PROGRESS, async {
            self.progress()
                .find(query)
                .await?
                .try_collect()
                .await
        })
        .await
    }

    async fn count_completed_progress(
        &self,
        student: ObjectId,
        course: Option<ObjectId>,
    ) -> StoreResult<u64> {
        let mut query = doc! { "student_id": student, "is_completed": true };
        if let Some(course) = course {
            query.insert("course_id", course);
        }
        tracked(
            "count_documents",
            LESSON_PROGRESS,
            self.progress().count_documents(query),
        )
        .await
    }

    async fn delete_progress_for_lesson(&self, lesson: ObjectId) -> StoreResult<u64> {
        tracked(
            "delete_many",
            LESSON_PROGRESS,
            self.progress().delete_many(doc! { "lesson_id": lesson }),
        )
        .await
        .map(|result| result.deleted_count)
    }

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        tracked("insert_one", QUIZZES, self.quizzes().insert_one(quiz))
            .await
            .map(|_| ())
    }

    async fn find_quiz(&self, id: ObjectId) -> StoreResult<Option<Quiz>> {
        tracked("find_one", QUIZZES, self.quizzes().find_one(doc! { "_id": id })).await
    }

    async fn find_quizzes(&self, ids: &[ObjectId]) -> StoreResult<Vec<Quiz>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        tracked("find", QUIZZES, async {
            self.quizzes()
                .find(doc! { "_id": { "$in": ids.to_vec() } })
                .await?
                .try_collect()
                .await
        })
        .await
    }

    async fn list_quizzes(&self, lesson_id: ObjectId) -> StoreResult<Vec<Quiz>> {
        let coll = self.quizzes();
        let find = coll
            .find(doc! { "lesson_id": lesson_id })
            .sort(doc! { "createdAt": 1, "_id": 1 });
        tracked("find", QUIZZES, async { find.await?.try_collect().await }).await
    }

    async fn delete_quiz(&self, id: ObjectId) -> StoreResult<()> {
        tracked(
            "delete_many",
            QUESTIONS,
            self.questions().delete_many(doc! { "quiz_id": id }),
        )
        .await?;
        tracked(
            "delete_many",
            QUIZ_ATTEMPTS,
            self.attempts().delete_many(doc! { "quiz_id": id }),
        )
        .await?;
        tracked(
            "delete_many",
            QUIZ_DRAFTS,
            self.drafts().delete_many(doc! { "quiz_id": id }),
        )
        .await?;
        tracked("delete_one", QUIZZES, self.quizzes().delete_one(doc! { "_id": id }))
            .await
            .map(|_| ())
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        tracked("insert_one", QUESTIONS, self.questions().insert_one(question))
            .await
            .map(|_| ())
    }

    async fn find_question(&self, id: ObjectId) -> StoreResult<Option<Question>> {
        tracked(
            "find_one",
            QUESTIONS,
            self.questions().find_one(doc! { "_id": id }),
        )
        .await
    }

    async fn list_questions(&self, quiz_id: ObjectId) -> StoreResult<Vec<Question>> {
        let coll = self.questions();
        let find = coll
            .find(doc! { "quiz_id": quiz_id })
            .sort(doc! { "order": 1, "_id": 1 });
        tracked("find", QUESTIONS, async { find.await?.try_collect().await }).await
    }

    async fn delete_question(&self, id: ObjectId) -> StoreResult<()> {
        tracked(
            "delete_one",
            QUESTIONS,
            self.questions().delete_one(doc! { "_id": id }),
        )
        .await
        .map(|_| ())
    }

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> StoreResult<()> {
        tracked("insert_one", QUIZ_ATTEMPTS, self.attempts().insert_one(attempt))
            .await
            .map(|_| ())
    }

    async fn find_attempt(&self, id: ObjectId) -> StoreResult<Option<QuizAttempt>> {
        tracked(
            "find_one",
            QUIZ_ATTEMPTS,
            self.attempts().find_one(doc! { "_id": id }),
        )
        .await
    }

    async fn list_attempts(&self, filter: &AttemptFilter) -> StoreResult<Vec<QuizAttempt>> {
        let mut query = Document::new();
        if let Some(student) = filter.student {
            query.insert("student_id", student);
        }
        if let Some(quiz) = filter.quiz {
            query.insert("quiz_id", quiz);
        }
        let coll = self.attempts();
        let find = coll
            .find(query)
            .sort(doc! { "startedAt": -1, "_id": -1 });
        tracked("find", QUIZ_ATTEMPTS, async {
            find.await?.try_collect().await
        })
        .await
    }

    async fn save_draft(&self, draft: &QuizDraft) -> StoreResult<()> {
        tracked(
            "replace_one",
            QUIZ_DRAFTS,
            self.drafts()
                .replace_one(
                    doc! { "student_id": draft.student_id, "quiz_id": draft.quiz_id },
                    draft,
                )
                .upsert(true),
        )
        .await
        .map(|_| ())
    }

    async fn find_draft(
        &self,
        student: ObjectId,
        quiz: ObjectId,
    ) -> StoreResult<Option<QuizDraft>> {
        tracked(
            "find_one",
            QUIZ_DRAFTS,
            self.drafts()
                .find_one(doc! { "student_id": student, "quiz_id": quiz }),
        )
        .await
    }

    async fn find_subscriber(&self, email: &str) -> StoreResult<Option<NewsletterSubscriber>> {
        tracked(
            "find_one",
            NEWSLETTER,
            self.newsletter().find_one(doc! { "email": email }),
        )
        .await
    }

    async fn insert_subscriber(&self, subscriber: &NewsletterSubscriber) -> StoreResult<()> {
        track_db_operation("insert_one", NEWSLETTER, async {
            self.newsletter()
                .insert_one(subscriber)
                .await
                .map(|_| ())
                .map_err(|e| classify_write(e, "email"))
        })
        .await
    }

    async fn set_subscriber_active(&self, id: ObjectId, is_active: bool) -> StoreResult<()> {
        tracked(
            "update_one",
            NEWSLETTER,
            self.newsletter().update_one(
                doc! { "_id": id },
                doc! { "$set": { "is_active": is_active } },
            ),
        )
        .await
        .map(|_| ())
    }
}
