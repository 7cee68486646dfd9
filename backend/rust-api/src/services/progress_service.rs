use mongodb::bson::oid::ObjectId;
use std::sync::Arc;

use crate::metrics::PROGRESS_RECALCULATIONS_TOTAL;
use crate::models::lesson::Lesson;
use crate::store::{EnrollmentFilter, LmsStore, StoreResult};

/// Share of completed lessons as a whole percentage.
///
/// `None` when the course has no lessons. Rounds half to even, so 1/8 gives
/// 12 and 3/8 gives 38; never exceeds 100.
pub fn completion_percentage(completed: u64, total: u64) -> Option<u32> {
    if total == 0 {
        return None;
    }
    let percent = (completed as f64 / total as f64 * 100.0).round_ties_even();
    Some(percent.clamp(0.0, 100.0) as u32)
}

/// How the enrollment's completion flag is derived from the new percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// After a completed lesson was saved: the flag is only ever raised.
    Sticky,
    /// After progress was removed or the lesson set changed: the flag follows
    /// the percentage and may clear.
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcOutcome {
    Updated { progress: u32, is_completed: bool },
    NoEnrollment,
    NoLessons,
}

impl RecalcOutcome {
    fn label(&self) -> &'static str {
        match self {
            RecalcOutcome::Updated { .. } => "updated",
            RecalcOutcome::NoEnrollment => "no_enrollment",
            RecalcOutcome::NoLessons => "no_lessons",
        }
    }
}

/// Keeps `Enrollment.progress` in step with the student's completed lessons.
pub struct ProgressRecalculator {
    store: Arc<dyn LmsStore>,
}

impl ProgressRecalculator {
    pub fn new(store: Arc<dyn LmsStore>) -> Self {
        Self { store }
    }

    pub async fn recalculate(
        &self,
        student: ObjectId,
        course: ObjectId,
        mode: CompletionMode,
    ) -> StoreResult<RecalcOutcome> {
        let outcome = self.apply(student, course, mode).await?;

        PROGRESS_RECALCULATIONS_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();

        if let RecalcOutcome::Updated {
            progress,
            is_completed,
        } = outcome
        {
            tracing::debug!(
                %student,
                %course,
                progress,
                is_completed,
                ?mode,
                "Enrollment progress recalculated"
            );
        }

        Ok(outcome)
    }

    async fn apply(
        &self,
        student: ObjectId,
        course: ObjectId,
        mode: CompletionMode,
    ) -> StoreResult<RecalcOutcome> {
        let Some(enrollment) = self.store.find_enrollment(student, course).await? else {
            return Ok(RecalcOutcome::NoEnrollment);
        };

        let total = self
            .store
            .count_lessons_by_course(&[course])
            .await?
            .get(&course)
            .copied()
            .unwrap_or(0);

        let completed = self
            .store
            .count_completed_progress(student, Some(course))
            .await?;

        let Some(progress) = completion_percentage(completed, total) else {
            return Ok(RecalcOutcome::NoLessons);
        };

        let is_completed = match mode {
            CompletionMode::Sticky => enrollment.is_completed || progress >= 100,
            CompletionMode::Fresh => progress >= 100,
        };

        self.store
            .update_enrollment_progress(enrollment.id, progress, is_completed)
            .await?;

        Ok(RecalcOutcome::Updated {
            progress,
            is_completed,
        })
    }

    /// Recomputes every enrollment of a course, used when its lesson set changes.
    pub async fn recalculate_course(&self, course: ObjectId, mode: CompletionMode) -> StoreResult<usize> {
        let enrollments = self
            .store
            .list_enrollments(&EnrollmentFilter {
                courses: Some(vec![course]),
                ..Default::default()
            })
            .await?;

        for enrollment in &enrollments {
            self.recalculate(enrollment.student_id, course, mode).await?;
        }

        Ok(enrollments.len())
    }

    /// Removes the student's record for a lesson and recomputes, whether or
    /// not a record existed.
    pub async fn delete_lesson_progress(
        &self,
        student: ObjectId,
        lesson: &Lesson,
    ) -> StoreResult<RecalcOutcome> {
        let removed = self.store.delete_progress(student, lesson.id).await?;
        if removed {
            tracing::info!(%student, lesson = %lesson.id, "Lesson progress removed");
        }
        self.recalculate(student, lesson.course_id, CompletionMode::Fresh)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::course::Enrollment;
    use crate::models::lesson::LessonProgress;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[test]
    fn percentage_rounds_half_to_even() {
        assert_eq!(completion_percentage(1, 8), Some(12));
        assert_eq!(completion_percentage(3, 8), Some(38));
        assert_eq!(completion_percentage(2, 4), Some(50));
        assert_eq!(completion_percentage(1, 3), Some(33));
        assert_eq!(completion_percentage(2, 3), Some(67));
    }

    #[test]
    fn percentage_is_none_without_lessons_and_capped() {
        assert_eq!(completion_percentage(0, 0), None);
        assert_eq!(completion_percentage(5, 0), None);
        assert_eq!(completion_percentage(5, 4), Some(100));
    }

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

    async fn complete(store: &MemoryStore, student: ObjectId, lesson: &Lesson) {
        let mut progress = LessonProgress::new(student, lesson);
        progress.is_completed = true;
        progress.completed_at = Some(Utc::now());
        store.save_progress(&progress).await.unwrap();
    }

    #[tokio::test]
    async fn recalculation_tracks_completed_lessons() {
        let store = Arc::new(MemoryStore::new());
        let student = ObjectId::new();
        let course = ObjectId::new();
        store
            .insert_enrollment(&Enrollment::new(student, course))
            .await
            .unwrap();

        let lessons: Vec<Lesson> = (1..=4).map(|order| lesson(course, order)).collect();
        for l in &lessons {
            store.insert_lesson(l).await.unwrap();
        }

        let recalculator = ProgressRecalculator::new(store.clone());

        complete(&store, student, &lessons[0]).await;
        complete(&store, student, &lessons[1]).await;
        let outcome = recalculator
            .recalculate(student, course, CompletionMode::Sticky)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecalcOutcome::Updated {
                progress: 50,
                is_completed: false
            }
        );

        complete(&store, student, &lessons[2]).await;
        complete(&store, student, &lessons[3]).await;
        recalculator
            .recalculate(student, course, CompletionMode::Sticky)
            .await
            .unwrap();
        let enrollment = store.find_enrollment(student, course).await.unwrap().unwrap();
        assert_eq!(enrollment.progress, 100);
        assert!(enrollment.is_completed);

        // Same data, same answer.
        let again = recalculator
            .recalculate(student, course, CompletionMode::Sticky)
            .await
            .unwrap();
        assert_eq!(
            again,
            RecalcOutcome::Updated {
                progress: 100,
                is_completed: true
            }
        );

        let outcome = recalculator
            .delete_lesson_progress(student, &lessons[3])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecalcOutcome::Updated {
                progress: 75,
                is_completed: false
            }
        );
    }

    #[tokio::test]
    async fn recalculation_is_noop_without_enrollment_or_lessons() {
        let store = Arc::new(MemoryStore::new());
        let student = ObjectId::new();
        let course = ObjectId::new();
        let recalculator = ProgressRecalculator::new(store.clone());

        assert_eq!(
            recalculator
                .recalculate(student, course, CompletionMode::Fresh)
                .await
                .unwrap(),
            RecalcOutcome::NoEnrollment
        );

        let mut enrollment = Enrollment::new(student, course);
        enrollment.progress = 40;
        store.insert_enrollment(&enrollment).await.unwrap();

        assert_eq!(
            recalculator
                .recalculate(student, course, CompletionMode::Fresh)
                .await
                .unwrap(),
            RecalcOutcome::NoLessons
        );
        let stored = store.find_enrollment(student, course).await.unwrap().unwrap();
        assert_eq!(stored.progress, 40);
    }

    #[tokio::test]
    async fn sticky_mode_keeps_completion_fresh_mode_clears_it() {
        let store = Arc::new(MemoryStore::new());
        let student = ObjectId::new();
        let course = ObjectId::new();
        store
            .insert_enrollment(&Enrollment::new(student, course))
            .await
            .unwrap();
        let first = lesson(course, 1);
        store.insert_lesson(&first).await.unwrap();
        complete(&store, student, &first).await;

        let recalculator = ProgressRecalculator::new(store.clone());
        recalculator
            .recalculate(student, course, CompletionMode::Sticky)
            .await
            .unwrap();

        // A new lesson drops the percentage to 50.
        store.insert_lesson(&lesson(course, 2)).await.unwrap();
        let sticky = recalculator
            .recalculate(student, course, CompletionMode::Sticky)
            .await
            .unwrap();
        assert_eq!(
            sticky,
            RecalcOutcome::Updated {
                progress: 50,
                is_completed: true
            }
        );

        let fresh = recalculator.recalculate_course(course, CompletionMode::Fresh).await.unwrap();
        assert_eq!(fresh, 1);
        let enrollment = store.find_enrollment(student, course).await.unwrap().unwrap();
        assert_eq!(enrollment.progress, 50);
        assert!(!enrollment.is_completed);
    }
}
