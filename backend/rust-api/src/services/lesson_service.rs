use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use validator::Validate;

use super::progress_service::{CompletionMode, ProgressRecalculator};
use super::{parse_id, require_role, ServiceError, ServiceResult};
use crate::metrics::LESSON_COMPLETIONS_TOTAL;
use crate::models::course::Course;
use crate::models::lesson::{
    CourseRef, CreateLessonRequest, Lesson, LessonDetail, LessonDetailResponse,
    LessonListResponse, LessonProgress, LessonProgressReply, LessonSummary, ProgressView,
    ReorderLessonsRequest, UpdateLessonRequest, UpdateProgressRequest,
};
use crate::models::quiz::QuizSummary;
use crate::models::user::{Caller, UserRole};
use crate::models::ApiMessage;
use crate::store::{LmsStore, StoreError};

const NOT_ENROLLED: &str = "You are not enrolled in this course";

pub struct LessonService {
    store: Arc<dyn LmsStore>,
    recalculator: ProgressRecalculator,
}

impl LessonService {
    pub fn new(store: Arc<dyn LmsStore>) -> Self {
        Self {
            recalculator: ProgressRecalculator::new(store.clone()),
            store,
        }
    }

    async fn active_course(&self, course_id: &str) -> ServiceResult<Course> {
        let id = parse_id(course_id, "Course")?;
        match self.store.find_course(id).await? {
            Some(course) if course.is_active => Ok(course),
            _ => Err(ServiceError::not_found("Course not found")),
        }
    }

    async fn owned_course(&self, caller: &Caller, course_id: &str) -> ServiceResult<Course> {
        require_role(caller, UserRole::Teacher, "Only teachers can manage lessons")?;
        let id = parse_id(course_id, "Course")?;
        match self.store.find_course(id).await? {
            Some(course) if course.instructor_id == caller.id => Ok(course),
            _ => Err(ServiceError::not_found("Course not found")),
        }
    }

    async fn lesson_in(&self, course: &Course, lesson_id: &str) -> ServiceResult<Lesson> {
        let id = parse_id(lesson_id, "Lesson")?;
        match self.store.find_lesson(id).await? {
            Some(lesson) if lesson.course_id == course.id => Ok(lesson),
            _ => Err(ServiceError::not_found("Lesson not found")),
        }
    }

    async fn lesson(&self, lesson_id: &str) -> ServiceResult<Lesson> {
        let id = parse_id(lesson_id, "Lesson")?;
        self.store
            .find_lesson(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lesson not found"))
    }

    async fn is_enrolled(&self, caller: Option<&Caller>, course: ObjectId) -> ServiceResult<bool> {
        match caller {
            Some(caller) => Ok(self.store.find_enrollment(caller.id, course).await?.is_some()),
            None => Ok(false),
        }
    }

    /// Enrolled students, the course's instructor and admins see every lesson.
    fn can_view(caller: Option<&Caller>, course: &Course, is_enrolled: bool) -> bool {
        caller.is_some_and(|caller| {
            is_enrolled || caller.id == course.instructor_id || caller.is_admin()
        })
    }

    pub async fn list(
        &self,
        caller: Option<&Caller>,
        course_id: &str,
    ) -> ServiceResult<LessonListResponse> {
        let course = self.active_course(course_id).await?;
        let is_enrolled = self.is_enrolled(caller, course.id).await?;
        let can_view = Self::can_view(caller, &course, is_enrolled);

        let lessons: Vec<LessonSummary> = self
            .store
            .list_lessons(course.id)
            .await?
            .iter()
            .filter(|lesson| can_view || lesson.is_free)
            .map(LessonSummary::from)
            .collect();

        let lesson_progress = match caller {
            Some(caller) if is_enrolled => self
                .store
                .list_progress(caller.id, Some(course.id))
                .await?
                .iter()
                .map(|p| (p.lesson_id.to_hex(), ProgressView::from(p)))
                .collect(),
            _ => Default::default(),
        };

        Ok(LessonListResponse {
            course: CourseRef {
                id: course.id.to_hex(),
                title: course.title,
            },
            lessons,
            is_enrolled,
            can_view,
            lesson_progress,
        })
    }

    pub async fn detail(
        &self,
        caller: Option<&Caller>,
        course_id: &str,
        lesson_id: &str,
    ) -> ServiceResult<LessonDetailResponse> {
        let course = self.active_course(course_id).await?;
        let lesson = self.lesson_in(&course, lesson_id).await?;

        let is_enrolled = self.is_enrolled(caller, course.id).await?;
        if !lesson.is_free && !Self::can_view(caller, &course, is_enrolled) {
            return Err(ServiceError::forbidden(
                "You need to enroll in the course to view this lesson",
            ));
        }

        let lesson_progress = match caller {
            Some(caller) if is_enrolled => {
                let progress = match self.store.find_progress(caller.id, lesson.id).await? {
                    Some(progress) => progress,
                    None => {
                        let progress = LessonProgress::new(caller.id, &lesson);
                        self.store.save_progress(&progress).await?;
                        progress
                    }
                };
                Some(ProgressView::from(&progress))
            }
            _ => None,
        };

        let quizzes = self
            .store
            .list_quizzes(lesson.id)
            .await?
            .iter()
            .map(QuizSummary::from)
            .collect();

        let lessons = self.store.list_lessons(course.id).await?;
        let prev_lesson = lessons
            .iter()
            .rev()
            .find(|l| l.order < lesson.order)
            .map(LessonSummary::from);
        let next_lesson = lessons
            .iter()
            .find(|l| l.order > lesson.order)
            .map(LessonSummary::from);

        Ok(LessonDetailResponse {
            course: CourseRef {
                id: course.id.to_hex(),
                title: course.title,
            },
            lesson: LessonDetail::from(lesson),
            lesson_progress,
            quizzes,
            prev_lesson,
            next_lesson,
            is_enrolled,
        })
    }

    pub async fn mark_complete(
        &self,
        caller: &Caller,
        lesson_id: &str,
    ) -> ServiceResult<LessonProgressReply> {
        let lesson = self.lesson(lesson_id).await?;
        if !self.is_enrolled(Some(caller), lesson.course_id).await? {
            return Ok(LessonProgressReply::refused(NOT_ENROLLED));
        }

        let existing = self.store.find_progress(caller.id, lesson.id).await?;
        let already_completed = existing.as_ref().is_some_and(|p| p.is_completed);

        if !already_completed {
            let progress = match existing {
                Some(mut progress) => {
                    progress.is_completed = true;
                    progress.completed_at = Some(Utc::now());
                    progress
                }
                None => {
                    let mut progress = LessonProgress::new(caller.id, &lesson);
                    progress.is_completed = true;
                    progress.completed_at = Some(Utc::now());
                    progress.watched_duration = lesson.duration_seconds();
                    progress
                }
            };
            self.store.save_progress(&progress).await?;
            LESSON_COMPLETIONS_TOTAL.with_label_values(&["manual"]).inc();
            tracing::info!("Lesson {} completed by {}", lesson.id, caller.id);
        }

        self.recalculator
            .recalculate(caller.id, lesson.course_id, CompletionMode::Sticky)
            .await?;

        let message = if already_completed {
            "Lesson already completed"
        } else {
            "Lesson completed"
        };

        Ok(LessonProgressReply {
            success: true,
            message: Some(message.to_string()),
            watched_duration: None,
            is_completed: Some(true),
        })
    }

    pub async fn update_progress(
        &self,
        caller: &Caller,
        lesson_id: &str,
        req: UpdateProgressRequest,
    ) -> ServiceResult<LessonProgressReply> {
        let lesson = self.lesson(lesson_id).await?;
        if !self.is_enrolled(Some(caller), lesson.course_id).await? {
            return Ok(LessonProgressReply::refused(NOT_ENROLLED));
        }

        let watched = match req.seconds().and_then(|s| u64::try_from(s).ok()) {
            Some(watched) => watched,
            None => return Ok(LessonProgressReply::refused("Invalid watched duration")),
        };

        let mut progress = self
            .store
            .find_progress(caller.id, lesson.id)
            .await?
            .unwrap_or_else(|| LessonProgress::new(caller.id, &lesson));

        progress.watched_duration = progress.watched_duration.max(watched);

        let newly_completed =
            !progress.is_completed && progress.watched_duration >= lesson.completion_threshold_seconds();
        if newly_completed {
            progress.is_completed = true;
            progress.completed_at = Some(Utc::now());
        }

        self.store.save_progress(&progress).await?;

        if newly_completed {
            LESSON_COMPLETIONS_TOTAL.with_label_values(&["watched"]).inc();
            tracing::info!("Lesson {} completed by watching ({}s)", lesson.id, progress.watched_duration);
        }
        if progress.is_completed {
            self.recalculator
                .recalculate(caller.id, lesson.course_id, CompletionMode::Sticky)
                .await?;
        }

        Ok(LessonProgressReply {
            success: true,
            message: None,
            watched_duration: Some(progress.watched_duration),
            is_completed: Some(progress.is_completed),
        })
    }

    pub async fn reset_progress(&self, caller: &Caller, lesson_id: &str) -> ServiceResult<ApiMessage> {
        let lesson = self.lesson(lesson_id).await?;
        self.recalculator
            .delete_lesson_progress(caller.id, &lesson)
            .await?;
        Ok(ApiMessage::ok("Lesson progress reset"))
    }

    pub async fn create(
        &self,
        caller: &Caller,
        course_id: &str,
        req: CreateLessonRequest,
    ) -> ServiceResult<LessonDetail> {
        let course = self.owned_course(caller, course_id).await?;
        req.validate()?;

        let order = self
            .store
            .list_lessons(course.id)
            .await?
            .last()
            .map_or(1, |last| last.order + 1);

        let lesson = Lesson {
            id: ObjectId::new(),
            course_id: course.id,
            title: req.title.trim().to_string(),
            description: req.description,
            video_url: req.video_url.unwrap_or_default().trim().to_string(),
            content: req.content,
            order,
            duration_minutes: req.duration_minutes,
            is_free: req.is_free,
            created_at: Utc::now(),
        };
        self.store.insert_lesson(&lesson).await?;

        tracing::info!("Lesson {} created in course {} at order {}", lesson.id, course.id, order);

        self.recalculator
            .recalculate_course(course.id, CompletionMode::Fresh)
            .await?;

        Ok(LessonDetail::from(lesson))
    }

    pub async fn update(
        &self,
        caller: &Caller,
        course_id: &str,
        lesson_id: &str,
        req: UpdateLessonRequest,
    ) -> ServiceResult<LessonDetail> {
        let course = self.owned_course(caller, course_id).await?;
        let mut lesson = self.lesson_in(&course, lesson_id).await?;
        req.validate()?;

        lesson.title = req.title.trim().to_string();
        lesson.description = req.description;
        lesson.video_url = req.video_url.unwrap_or_default().trim().to_string();
        lesson.content = req.content;
        lesson.duration_minutes = req.duration_minutes;
        lesson.is_free = req.is_free;
        if let Some(order) = req.order {
            lesson.order = order;
        }

        self.store.update_lesson(&lesson).await.map_err(|e| match e {
            StoreError::Duplicate(_) => {
                ServiceError::conflict("Another lesson of this course already has that order")
            }
            other => other.into(),
        })?;

        tracing::info!("Lesson {} updated", lesson.id);
        Ok(LessonDetail::from(lesson))
    }

    /// Removes the lesson with its progress records and quizzes, then
    /// recomputes every enrollment of the course.
    pub async fn delete(
        &self,
        caller: &Caller,
        course_id: &str,
        lesson_id: &str,
    ) -> ServiceResult<ApiMessage> {
        let course = self.owned_course(caller, course_id).await?;
        let lesson = self.lesson_in(&course, lesson_id).await?;

        for quiz in self.store.list_quizzes(lesson.id).await? {
            self.store.delete_quiz(quiz.id).await?;
        }
        let removed = self.store.delete_progress_for_lesson(lesson.id).await?;
        self.store.delete_lesson(lesson.id).await?;

        let recalculated = self
            .recalculator
            .recalculate_course(course.id, CompletionMode::Fresh)
            .await?;

        tracing::info!(
            "Lesson {} deleted ({} progress records removed, {} enrollments recalculated)",
            lesson.id,
            removed,
            recalculated
        );

        Ok(ApiMessage::ok(format!("Lesson \"{}\" was deleted", lesson.title)))
    }

    /// Assigns positions 1..n in the given sequence. Ids of other courses
    /// keep their slot in the numbering but are not touched.
    pub async fn reorder(
        &self,
        caller: &Caller,
        course_id: &str,
        req: ReorderLessonsRequest,
    ) -> ServiceResult<ApiMessage> {
        let course = self.owned_course(caller, course_id).await?;

        let orders: Vec<(ObjectId, u32)> = req
            .lesson_order
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| {
                ObjectId::parse_str(raw.trim())
                    .ok()
                    .map(|id| (id, i as u32 + 1))
            })
            .collect();

        match self.store.reorder_lessons(course.id, &orders).await {
            Ok(()) => {
                tracing::info!("Lessons of course {} reordered", course.id);
                Ok(ApiMessage::ok("Lesson order updated"))
            }
            Err(StoreError::Duplicate(_)) => Ok(ApiMessage::fail(
                "Two lessons cannot share the same position",
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::course::{CourseLevel, Enrollment};
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: LessonService,
        teacher: Caller,
        student: Caller,
        course: Course,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let teacher = Caller {
            id: ObjectId::new(),
            role: UserRole::Teacher,
        };
        let student = Caller {
            id: ObjectId::new(),
            role: UserRole::Student,
        };
        let course = Course {
            id: ObjectId::new(),
            title: "Systems programming".to_string(),
            description: String::new(),
            instructor_id: teacher.id,
            level: CourseLevel::Intermediate,
            duration_weeks: 4,
            price: 0.0,
            is_active: true,
            created_at: Utc::now(),
        };
        store.insert_course(&course).await.unwrap();
        store
            .insert_enrollment(&Enrollment::new(student.id, course.id))
            .await
            .unwrap();

        Fixture {
            service: LessonService::new(store.clone()),
            store,
            teacher,
            student,
            course,
        }
    }

    fn lesson_request(title: &str, is_free: bool) -> CreateLessonRequest {
        CreateLessonRequest {
            title: title.to_string(),
            description: String::new(),
            video_url: None,
            content: String::new(),
            duration_minutes: 10,
            is_free,
        }
    }

    #[tokio::test]
    async fn create_assigns_next_order() {
        let f = fixture().await;
        let course_id = f.course.id.to_hex();
        let first = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Intro lesson", true))
            .await
            .unwrap();
        let second = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Second lesson", false))
            .await
            .unwrap();
        assert_eq!(first.order, 1);
        assert_eq!(second.order, 2);

        let err = f
            .service
            .create(&f.student, &course_id, lesson_request("Sneaky lesson", false))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn anonymous_visitors_only_see_free_lessons() {
        let f = fixture().await;
        let course_id = f.course.id.to_hex();
        f.service
            .create(&f.teacher, &course_id, lesson_request("Free preview", true))
            .await
            .unwrap();
        let paid = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Paid content", false))
            .await
            .unwrap();

        let list = f.service.list(None, &course_id).await.unwrap();
        assert!(!list.can_view);
        assert_eq!(list.lessons.len(), 1);

        let err = f.service.detail(None, &course_id, &paid.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let list = f.service.list(Some(&f.student), &course_id).await.unwrap();
        assert!(list.can_view);
        assert_eq!(list.lessons.len(), 2);
    }

    #[tokio::test]
    async fn detail_creates_progress_and_links_neighbours() {
        let f = fixture().await;
        let course_id = f.course.id.to_hex();
        let mut ids = Vec::new();
        for title in ["Lesson one", "Lesson two", "Lesson three"] {
            ids.push(
                f.service
                    .create(&f.teacher, &course_id, lesson_request(title, false))
                    .await
                    .unwrap()
                    .id,
            );
        }

        let detail = f
            .service
            .detail(Some(&f.student), &course_id, &ids[1])
            .await
            .unwrap();
        assert_eq!(detail.prev_lesson.unwrap().id, ids[0]);
        assert_eq!(detail.next_lesson.unwrap().id, ids[2]);
        let progress = detail.lesson_progress.unwrap();
        assert!(!progress.is_completed);

        let lesson_id = ObjectId::parse_str(&ids[1]).unwrap();
        assert!(f
            .store
            .find_progress(f.student.id, lesson_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn watching_eighty_percent_completes() {
        let f = fixture().await;
        let course_id = f.course.id.to_hex();
        let lesson = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Watch me", false))
            .await
            .unwrap();

        let reply = f
            .service
            .update_progress(
                &f.student,
                &lesson.id,
                UpdateProgressRequest {
                    watched_duration: Some(serde_json::json!(300)),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.is_completed, Some(false));

        // Lower values never shrink the stored duration.
        let reply = f
            .service
            .update_progress(
                &f.student,
                &lesson.id,
                UpdateProgressRequest {
                    watched_duration: Some(serde_json::json!("120")),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.watched_duration, Some(300));

        let reply = f
            .service
            .update_progress(
                &f.student,
                &lesson.id,
                UpdateProgressRequest {
                    watched_duration: Some(serde_json::json!(480)),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.is_completed, Some(true));

        let enrollment = f
            .store
            .find_enrollment(f.student.id, f.course.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.progress, 100);
        assert!(enrollment.is_completed);
    }

    #[tokio::test]
    async fn negative_progress_is_refused() {
        let f = fixture().await;
        let lesson = f
            .service
            .create(&f.teacher, &f.course.id.to_hex(), lesson_request("Watch me", false))
            .await
            .unwrap();

        let reply = f
            .service
            .update_progress(
                &f.student,
                &lesson.id,
                UpdateProgressRequest {
                    watched_duration: Some(serde_json::json!(-5)),
                },
            )
            .await
            .unwrap();
        assert!(!reply.success);
    }

    #[tokio::test]
    async fn deleting_a_lesson_recalculates_enrollments() {
        let f = fixture().await;
        let course_id = f.course.id.to_hex();
        let done = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Finished one", false))
            .await
            .unwrap();
        let pending = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Pending one", false))
            .await
            .unwrap();

        f.service.mark_complete(&f.student, &done.id).await.unwrap();
        let enrollment = f
            .store
            .find_enrollment(f.student.id, f.course.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.progress, 50);

        f.service
            .delete(&f.teacher, &course_id, &pending.id)
            .await
            .unwrap();
        let enrollment = f
            .store
            .find_enrollment(f.student.id, f.course.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.progress, 100);
        assert!(enrollment.is_completed);
    }

    #[tokio::test]
    async fn reorder_swaps_positions() {
        let f = fixture().await;
        let course_id = f.course.id.to_hex();
        let a = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Lesson alpha", false))
            .await
            .unwrap();
        let b = f
            .service
            .create(&f.teacher, &course_id, lesson_request("Lesson bravo", false))
            .await
            .unwrap();

        let reply = f
            .service
            .reorder(
                &f.teacher,
                &course_id,
                ReorderLessonsRequest {
                    lesson_order: vec![b.id.clone(), a.id.clone()],
                },
            )
            .await
            .unwrap();
        assert!(reply.success);

        let lessons = f.store.list_lessons(f.course.id).await.unwrap();
        assert_eq!(lessons[0].id.to_hex(), b.id);
        assert_eq!(lessons[1].id.to_hex(), a.id);

        // Only moving one lesson onto an occupied slot collides.
        let reply = f
            .service
            .reorder(
                &f.teacher,
                &course_id,
                ReorderLessonsRequest {
                    lesson_order: vec![a.id.clone()],
                },
            )
            .await
            .unwrap();
        assert!(!reply.success);
    }
}
