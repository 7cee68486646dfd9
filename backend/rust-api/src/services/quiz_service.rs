use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use validator::Validate;

use super::progress_service::completion_percentage;
use super::{parse_id, require_role, round1, ServiceError, ServiceResult};
use crate::config::QuizSettings;
use crate::metrics::QUIZ_ATTEMPTS_TOTAL;
use crate::models::course::Course;
use crate::models::lesson::{CourseRef, Lesson};
use crate::models::quiz::{
    AddQuestionRequest, AnsweredQuestion, AttemptAnswer, AttemptResultResponse, AttemptSummary,
    Choice, CreateQuizRequest, MyResultsQuery, MyResultsResponse, MyResultsStats, Question,
    QuestionView, Quiz, QuizAttempt, QuizDetailResponse, QuizDraft, QuizDraftResponse,
    QuizListItem, QuizListResponse, QuizStatisticsResponse, QuizSummary, ResultRow,
    ScoreRanges, StudentAttempt, SubmitQuizRequest, TakeQuizResponse,
};
use crate::models::user::{Caller, UserRole, UserSummary};
use crate::models::{ApiMessage, Page};
use crate::store::{AttemptFilter, EnrollmentFilter, LmsStore, StoreResult};

pub const RESULTS_PER_PAGE: usize = 20;
const RECENT_ATTEMPTS: usize = 10;

/// Grades a submission. `answers` maps question ids (optionally prefixed
/// with `question_`) to the selected choice id.
///
/// A question counts as correct only when the selected choice belongs to it
/// and is flagged correct. Returns the rounded percentage and the per-question
/// outcome in question order.
pub fn score_submission(
    questions: &[Question],
    answers: &HashMap<String, String>,
) -> (u32, Vec<AttemptAnswer>) {
    let selected: HashMap<&str, &str> = answers
        .iter()
        .map(|(key, value)| {
            let key = key.strip_prefix("question_").unwrap_or(key);
            (key.trim(), value.trim())
        })
        .collect();

    let graded: Vec<AttemptAnswer> = questions
        .iter()
        .map(|question| {
            let choice_id = selected
                .get(question.id.to_hex().as_str())
                .and_then(|raw| ObjectId::parse_str(raw).ok());
            let is_correct = choice_id
                .and_then(|id| question.choice(id))
                .is_some_and(|choice| choice.is_correct);
            AttemptAnswer {
                question_id: question.id,
                choice_id,
                is_correct,
            }
        })
        .collect();

    let correct = graded.iter().filter(|a| a.is_correct).count() as u64;
    let score = completion_percentage(correct, questions.len() as u64).unwrap_or(0);

    (score, graded)
}

/// Result rows with quiz titles and courses resolved.
pub(crate) async fn result_rows(
    store: &dyn LmsStore,
    attempts: &[QuizAttempt],
) -> StoreResult<Vec<ResultRow>> {
    let quiz_ids: Vec<ObjectId> = attempts
        .iter()
        .map(|a| a.quiz_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let titles: HashMap<ObjectId, String> = store
        .find_quizzes(&quiz_ids)
        .await?
        .into_iter()
        .map(|q| (q.id, q.title))
        .collect();

    let mut courses: HashMap<ObjectId, Option<CourseRef>> = HashMap::new();
    for attempt in attempts {
        if !courses.contains_key(&attempt.course_id) {
            let course = store.find_course(attempt.course_id).await?.map(|c| CourseRef {
                id: c.id.to_hex(),
                title: c.title,
            });
            courses.insert(attempt.course_id, course);
        }
    }

    Ok(attempts
        .iter()
        .map(|attempt| ResultRow {
            attempt: AttemptSummary::from(attempt),
            quiz_title: titles.get(&attempt.quiz_id).cloned().unwrap_or_default(),
            course: courses.get(&attempt.course_id).cloned().flatten(),
        })
        .collect())
}

fn average_score(attempts: &[QuizAttempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    let sum: u64 = attempts.iter().map(|a| u64::from(a.score)).sum();
    round1(sum as f64 / attempts.len() as f64)
}

fn course_ref(course: &Course) -> CourseRef {
    CourseRef {
        id: course.id.to_hex(),
        title: course.title.clone(),
    }
}

/// Quiz with its course, and what the caller may do with it.
struct QuizAccess {
    quiz: Quiz,
    course: Course,
    is_enrolled: bool,
    can_view: bool,
}

pub struct QuizService {
    store: Arc<dyn LmsStore>,
    settings: QuizSettings,
}

impl QuizService {
    pub fn new(store: Arc<dyn LmsStore>, settings: QuizSettings) -> Self {
        Self { store, settings }
    }

    async fn course_of(&self, course_id: ObjectId) -> ServiceResult<Course> {
        self.store
            .find_course(course_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Course not found"))
    }

    async fn is_enrolled(&self, caller: &Caller, course: ObjectId) -> ServiceResult<bool> {
        Ok(self.store.find_enrollment(caller.id, course).await?.is_some())
    }

    fn can_view(caller: &Caller, course: &Course, is_enrolled: bool) -> bool {
        is_enrolled || caller.id == course.instructor_id || caller.is_admin()
    }

    async fn access(&self, caller: &Caller, quiz_id: &str) -> ServiceResult<QuizAccess> {
        let id = parse_id(quiz_id, "Quiz")?;
        let quiz = self
            .store
            .find_quiz(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Quiz not found"))?;
        let course = self.course_of(quiz.course_id).await?;
        let is_enrolled = self.is_enrolled(caller, course.id).await?;
        let can_view = Self::can_view(caller, &course, is_enrolled);

        Ok(QuizAccess {
            quiz,
            course,
            is_enrolled,
            can_view,
        })
    }

    async fn owned_lesson(&self, caller: &Caller, lesson_id: &str) -> ServiceResult<Lesson> {
        require_role(caller, UserRole::Teacher, "Only teachers can manage quizzes")?;
        let id = parse_id(lesson_id, "Lesson")?;
        let lesson = self
            .store
            .find_lesson(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lesson not found"))?;
        let course = self.course_of(lesson.course_id).await?;
        if course.instructor_id != caller.id {
            return Err(ServiceError::not_found("Lesson not found"));
        }
        Ok(lesson)
    }

    async fn owned_quiz(&self, caller: &Caller, quiz_id: ObjectId) -> ServiceResult<Quiz> {
        require_role(caller, UserRole::Teacher, "Only teachers can manage quizzes")?;
        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Quiz not found"))?;
        let course = self.course_of(quiz.course_id).await?;
        if course.instructor_id != caller.id {
            return Err(ServiceError::not_found("Quiz not found"));
        }
        Ok(quiz)
    }

    async fn attempts_of(&self, student: ObjectId, quiz: ObjectId) -> ServiceResult<Vec<QuizAttempt>> {
        Ok(self
            .store
            .list_attempts(&AttemptFilter {
                student: Some(student),
                quiz: Some(quiz),
            })
            .await?)
    }

    pub async fn list(&self, caller: &Caller, lesson_id: &str) -> ServiceResult<QuizListResponse> {
        let id = parse_id(lesson_id, "Lesson")?;
        let lesson = self
            .store
            .find_lesson(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lesson not found"))?;
        let course = self.course_of(lesson.course_id).await?;

        let is_enrolled = self.is_enrolled(caller, course.id).await?;
        if !Self::can_view(caller, &course, is_enrolled) {
            return Err(ServiceError::forbidden(
                "You need to enroll in the course to view these quizzes",
            ));
        }

        let quizzes = self.store.list_quizzes(lesson.id).await?;
        let mut items = Vec::with_capacity(quizzes.len());
        for quiz in &quizzes {
            let latest_attempt = if is_enrolled {
                self.attempts_of(caller.id, quiz.id)
                    .await?
                    .first()
                    .map(AttemptSummary::from)
            } else {
                None
            };
            items.push(QuizListItem {
                quiz: QuizSummary::from(quiz),
                latest_attempt,
            });
        }

        Ok(QuizListResponse {
            lesson: CourseRef {
                id: lesson.id.to_hex(),
                title: lesson.title,
            },
            course: course_ref(&course),
            quizzes: items,
            is_enrolled,
        })
    }

    pub async fn detail(&self, caller: &Caller, quiz_id: &str) -> ServiceResult<QuizDetailResponse> {
        let access = self.access(caller, quiz_id).await?;
        if !access.can_view {
            return Err(ServiceError::forbidden(
                "You need to enroll in the course to view this quiz",
            ));
        }

        let questions_count = self.store.list_questions(access.quiz.id).await?.len() as u64;

        let attempts = if access.is_enrolled {
            self.attempts_of(caller.id, access.quiz.id).await?
        } else {
            Vec::new()
        };
        let best_score = attempts.iter().map(|a| a.score).max().unwrap_or(0);
        let can_attempt = !access.is_enrolled || (attempts.len() as u32) < self.settings.max_attempts;

        Ok(QuizDetailResponse {
            quiz: QuizSummary::from(&access.quiz),
            course: course_ref(&access.course),
            questions_count,
            user_attempts: attempts.iter().map(AttemptSummary::from).collect(),
            best_score,
            can_attempt,
            max_attempts: self.settings.max_attempts,
            is_enrolled: access.is_enrolled,
        })
    }

    async fn attemptable(&self, caller: &Caller, quiz_id: &str) -> ServiceResult<(QuizAccess, Vec<Question>)> {
        let access = self.access(caller, quiz_id).await?;
        if !access.is_enrolled {
            return Err(ServiceError::forbidden(
                "You need to enroll in the course to take this quiz",
            ));
        }

        let questions = self.store.list_questions(access.quiz.id).await?;
        if questions.is_empty() {
            return Err(ServiceError::bad_request("This quiz has no questions"));
        }

        Ok((access, questions))
    }

    pub async fn take(&self, caller: &Caller, quiz_id: &str) -> ServiceResult<TakeQuizResponse> {
        let (access, questions) = self.attemptable(caller, quiz_id).await?;

        Ok(TakeQuizResponse {
            quiz: QuizSummary::from(&access.quiz),
            course: course_ref(&access.course),
            questions: questions
                .iter()
                .map(|q| QuestionView::from_question(q, false))
                .collect(),
        })
    }

    /// Every submission is stored as a new attempt.
    pub async fn submit(
        &self,
        caller: &Caller,
        quiz_id: &str,
        req: SubmitQuizRequest,
    ) -> ServiceResult<AttemptResultResponse> {
        let started_at = Utc::now();
        let (access, questions) = self.attemptable(caller, quiz_id).await?;

        if self.settings.enforce_attempt_limit {
            let used = self.attempts_of(caller.id, access.quiz.id).await?.len() as u32;
            if used >= self.settings.max_attempts {
                return Err(ServiceError::forbidden(format!(
                    "You have used all {} attempts for this quiz",
                    self.settings.max_attempts
                )));
            }
        }

        let (score, answers) = score_submission(&questions, &req.answers);
        let is_passed = score >= access.quiz.passing_score;

        let attempt = QuizAttempt {
            id: ObjectId::new(),
            student_id: caller.id,
            quiz_id: access.quiz.id,
            course_id: access.course.id,
            score,
            is_passed,
            started_at,
            completed_at: Some(Utc::now()),
            answers,
        };
        self.store.insert_attempt(&attempt).await?;

        QUIZ_ATTEMPTS_TOTAL
            .with_label_values(&[if is_passed { "passed" } else { "failed" }])
            .inc();
        tracing::info!(
            "Quiz {} attempted by {}: score={} passed={}",
            access.quiz.id,
            caller.id,
            score,
            is_passed
        );

        Ok(Self::attempt_result(&attempt, &access.quiz, &questions))
    }

    pub async fn result(&self, caller: &Caller, attempt_id: &str) -> ServiceResult<AttemptResultResponse> {
        let id = parse_id(attempt_id, "Attempt")?;
        let attempt = match self.store.find_attempt(id).await? {
            Some(attempt) if attempt.student_id == caller.id => attempt,
            _ => return Err(ServiceError::not_found("Attempt not found")),
        };
        let quiz = self
            .store
            .find_quiz(attempt.quiz_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Quiz not found"))?;
        let questions = self.store.list_questions(quiz.id).await?;

        Ok(Self::attempt_result(&attempt, &quiz, &questions))
    }

    fn attempt_result(attempt: &QuizAttempt, quiz: &Quiz, questions: &[Question]) -> AttemptResultResponse {
        let given: HashMap<ObjectId, &AttemptAnswer> =
            attempt.answers.iter().map(|a| (a.question_id, a)).collect();

        AttemptResultResponse {
            attempt: AttemptSummary::from(attempt),
            quiz: QuizSummary::from(quiz),
            questions: questions
                .iter()
                .map(|question| {
                    let answer = given.get(&question.id);
                    AnsweredQuestion {
                        question: QuestionView::from_question(question, true),
                        selected_choice_id: answer
                            .and_then(|a| a.choice_id)
                            .map(|id| id.to_hex()),
                        is_correct: answer.is_some_and(|a| a.is_correct),
                    }
                })
                .collect(),
        }
    }

    pub async fn create(
        &self,
        caller: &Caller,
        lesson_id: &str,
        req: CreateQuizRequest,
    ) -> ServiceResult<QuizSummary> {
        let lesson = self.owned_lesson(caller, lesson_id).await?;
        req.validate()?;

        let quiz = Quiz {
            id: ObjectId::new(),
            lesson_id: lesson.id,
            course_id: lesson.course_id,
            title: req.title.trim().to_string(),
            description: req.description,
            passing_score: req.passing_score,
            time_limit: req.time_limit,
            created_at: Utc::now(),
        };
        self.store.insert_quiz(&quiz).await?;

        tracing::info!("Quiz {} created for lesson {}", quiz.id, lesson.id);
        Ok(QuizSummary::from(&quiz))
    }

    pub async fn add_question(
        &self,
        caller: &Caller,
        quiz_id: &str,
        req: AddQuestionRequest,
    ) -> ServiceResult<QuestionView> {
        let quiz = self.owned_quiz(caller, parse_id(quiz_id, "Quiz")?).await?;
        req.validate()?;

        let order = self
            .store
            .list_questions(quiz.id)
            .await?
            .last()
            .map_or(1, |last| last.order + 1);

        let question = Question {
            id: ObjectId::new(),
            quiz_id: quiz.id,
            text: req.text.trim().to_string(),
            order,
            choices: req
                .choices
                .into_iter()
                .filter(|choice| !choice.text.trim().is_empty())
                .map(|choice| Choice {
                    id: ObjectId::new(),
                    text: choice.text.trim().to_string(),
                    is_correct: choice.is_correct,
                })
                .collect(),
        };
        self.store.insert_question(&question).await?;

        tracing::info!("Question {} added to quiz {}", question.id, quiz.id);
        Ok(QuestionView::from_question(&question, true))
    }

    pub async fn delete_question(&self, caller: &Caller, question_id: &str) -> ServiceResult<ApiMessage> {
        let id = parse_id(question_id, "Question")?;
        let question = self
            .store
            .find_question(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Question not found"))?;
        self.owned_quiz(caller, question.quiz_id)
            .await
            .map_err(|e| match e {
                ServiceError::NotFound(_) => ServiceError::not_found("Question not found"),
                other => other,
            })?;

        self.store.delete_question(question.id).await?;

        let preview: String = question.text.chars().take(50).collect();
        tracing::info!("Question {} deleted from quiz {}", question.id, question.quiz_id);
        Ok(ApiMessage::ok(format!("Question deleted: {}...", preview)))
    }

    pub async fn statistics(&self, caller: &Caller, quiz_id: &str) -> ServiceResult<QuizStatisticsResponse> {
        let quiz = self.owned_quiz(caller, parse_id(quiz_id, "Quiz")?).await?;

        let attempts = self
            .store
            .list_attempts(&AttemptFilter {
                quiz: Some(quiz.id),
                ..Default::default()
            })
            .await?;

        let total_attempts = attempts.len() as u64;
        let unique_students = attempts
            .iter()
            .map(|a| a.student_id)
            .collect::<HashSet<_>>()
            .len() as u64;
        let passed_attempts = attempts.iter().filter(|a| a.is_passed).count() as u64;
        let pass_rate = if total_attempts == 0 {
            0.0
        } else {
            round1(passed_attempts as f64 / total_attempts as f64 * 100.0)
        };

        let mut score_ranges = ScoreRanges::default();
        for attempt in &attempts {
            score_ranges.record(attempt.score);
        }

        let recent = &attempts[..attempts.len().min(RECENT_ATTEMPTS)];
        let student_ids: Vec<ObjectId> = recent.iter().map(|a| a.student_id).collect();
        let students: HashMap<ObjectId, UserSummary> = self
            .store
            .find_users(&student_ids)
            .await?
            .iter()
            .map(|u| (u.id, UserSummary::from(u)))
            .collect();

        Ok(QuizStatisticsResponse {
            quiz: QuizSummary::from(&quiz),
            total_attempts,
            unique_students,
            passed_attempts,
            pass_rate,
            avg_score: average_score(&attempts),
            score_ranges,
            recent_attempts: recent
                .iter()
                .map(|attempt| StudentAttempt {
                    attempt: AttemptSummary::from(attempt),
                    student: students.get(&attempt.student_id).cloned(),
                })
                .collect(),
        })
    }

    pub async fn my_results(&self, caller: &Caller, query: MyResultsQuery) -> ServiceResult<MyResultsResponse> {
        let course_filter = query
            .course
            .as_deref()
            .and_then(|raw| ObjectId::parse_str(raw.trim()).ok());
        let passed_filter = match query.passed.as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        };

        let mut attempts: Vec<QuizAttempt> = self
            .store
            .list_attempts(&AttemptFilter {
                student: Some(caller.id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|a| a.completed_at.is_some())
            .filter(|a| course_filter.is_none_or(|course| a.course_id == course))
            .filter(|a| passed_filter.is_none_or(|passed| a.is_passed == passed))
            .collect();
        attempts.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        let stats = MyResultsStats {
            total_attempts: attempts.len() as u64,
            passed_attempts: attempts.iter().filter(|a| a.is_passed).count() as u64,
            avg_score: average_score(&attempts),
        };

        let page = Page::paginate(attempts, query.page.as_deref(), RESULTS_PER_PAGE);
        let rows = result_rows(self.store.as_ref(), &page.items).await?;
        let attempts = Page {
            items: rows,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages,
        };

        let mut enrolled_courses = Vec::new();
        for enrollment in self
            .store
            .list_enrollments(&EnrollmentFilter {
                student: Some(caller.id),
                ..Default::default()
            })
            .await?
        {
            if let Some(course) = self.store.find_course(enrollment.course_id).await? {
                enrolled_courses.push(course_ref(&course));
            }
        }

        Ok(MyResultsResponse {
            attempts,
            stats,
            enrolled_courses,
            current_course: query.course,
            passed_only: query.passed,
        })
    }

    /// Stores the raw JSON body as the caller's draft for this quiz.
    pub async fn save_draft(&self, caller: &Caller, quiz_id: &str, body: &[u8]) -> ServiceResult<ApiMessage> {
        let access = self.access(caller, quiz_id).await?;
        if !access.is_enrolled {
            return Ok(ApiMessage::fail("Access denied"));
        }

        let Ok(data) = serde_json::from_slice::<serde_json::Value>(body) else {
            return Ok(ApiMessage::fail("Invalid data"));
        };

        let draft = QuizDraft {
            id: ObjectId::new(),
            student_id: caller.id,
            quiz_id: access.quiz.id,
            data,
            updated_at: Utc::now(),
        };
        self.store.save_draft(&draft).await?;

        tracing::debug!("Draft saved for quiz {} by {}", access.quiz.id, caller.id);
        Ok(ApiMessage::ok("Progress saved"))
    }

    pub async fn load_draft(&self, caller: &Caller, quiz_id: &str) -> ServiceResult<QuizDraftResponse> {
        let access = self.access(caller, quiz_id).await?;
        if !access.is_enrolled {
            return Err(ServiceError::forbidden("Access denied"));
        }

        let draft = self.store.find_draft(caller.id, access.quiz.id).await?;
        Ok(QuizDraftResponse {
            updated_at: draft.as_ref().map(|d| d.updated_at),
            data: draft.map(|d| d.data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct_index: usize, choices: usize) -> Question {
        Question {
            id: ObjectId::new(),
            quiz_id: ObjectId::new(),
            text: "Which option is right?".to_string(),
            order: 1,
            choices: (0..choices)
                .map(|i| Choice {
                    id: ObjectId::new(),
                    text: format!("Option {}", i),
                    is_correct: i == correct_index,
                })
                .collect(),
        }
    }

    #[test]
    fn scores_four_of_five_as_eighty() {
        let questions: Vec<Question> = (0..5).map(|_| question(0, 3)).collect();
        let mut answers = HashMap::new();
        for (i, q) in questions.iter().enumerate() {
            let pick = if i == 4 { 1 } else { 0 };
            answers.insert(q.id.to_hex(), q.choices[pick].id.to_hex());
        }

        let (score, graded) = score_submission(&questions, &answers);
        assert_eq!(score, 80);
        assert_eq!(graded.iter().filter(|a| a.is_correct).count(), 4);
        assert!(!graded[4].is_correct);
    }

    #[test]
    fn unanswered_and_foreign_choices_are_wrong() {
        let questions = vec![question(0, 2), question(0, 2), question(0, 2)];
        let mut answers = HashMap::new();
        // Correct choice of another question.
        answers.insert(
            questions[0].id.to_hex(),
            questions[1].choices[0].id.to_hex(),
        );
        answers.insert(questions[1].id.to_hex(), "not-an-id".to_string());
        answers.insert(
            format!("question_{}", questions[2].id.to_hex()),
            questions[2].choices[0].id.to_hex(),
        );

        let (score, graded) = score_submission(&questions, &answers);
        assert_eq!(score, 33);
        assert!(!graded[0].is_correct);
        assert_eq!(graded[1].choice_id, None);
        assert!(graded[2].is_correct);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        let (score, graded) = score_submission(&[], &HashMap::new());
        assert_eq!(score, 0);
        assert!(graded.is_empty());
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        let attempt = |score| QuizAttempt {
            id: ObjectId::new(),
            student_id: ObjectId::new(),
            quiz_id: ObjectId::new(),
            course_id: ObjectId::new(),
            score,
            is_passed: false,
            started_at: Utc::now(),
            completed_at: None,
            answers: Vec::new(),
        };
        assert_eq!(average_score(&[attempt(70), attempt(80), attempt(81)]), 77.0);
        assert_eq!(average_score(&[attempt(70), attempt(81), attempt(81)]), 77.3);
        assert_eq!(average_score(&[]), 0.0);
    }
}
