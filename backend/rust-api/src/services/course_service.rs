use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use super::{parse_id, require_role, ServiceError, ServiceResult};
use crate::metrics::ENROLLMENTS_TOTAL;
use crate::models::course::{
    CatalogQuery, CatalogResponse, CatalogSort, CatalogStats, Course, CourseCard,
    CourseDetailResponse, CourseLevel, CreateCourseRequest, EnrolledCourse, Enrollment,
    EnrollmentView, InstructorCoursesResponse, InstructorStats, LevelChoice,
    LevelCoursesResponse, MyCoursesResponse, StatusQuery, StudentCoursesResponse,
    UpdateCourseRequest,
};
use crate::models::lesson::LessonSummary;
use crate::models::user::{Caller, UserRole, UserSummary};
use crate::models::{ApiMessage, Page, PageQuery};
use crate::store::{
    CourseFilter, EnrollmentFilter, LmsStore, StoreError, StoreResult, UserFilter,
};

pub const COURSES_PER_PAGE: usize = 12;
const OTHER_COURSES: usize = 3;

/// Decorates courses with their instructor and student/lesson counts.
pub(crate) async fn course_cards(
    store: &dyn LmsStore,
    courses: &[Course],
) -> StoreResult<Vec<CourseCard>> {
    if courses.is_empty() {
        return Ok(Vec::new());
    }

    let course_ids: Vec<ObjectId> = courses.iter().map(|c| c.id).collect();
    let mut instructor_ids: Vec<ObjectId> = courses.iter().map(|c| c.instructor_id).collect();
    instructor_ids.sort();
    instructor_ids.dedup();

    let instructors: HashMap<ObjectId, UserSummary> = store
        .find_users(&instructor_ids)
        .await?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();
    let students = store.count_enrollments_by_course(&course_ids).await?;
    let lessons = store.count_lessons_by_course(&course_ids).await?;

    Ok(courses
        .iter()
        .map(|course| {
            CourseCard::new(
                course,
                instructors.get(&course.instructor_id).cloned(),
                students.get(&course.id).copied().unwrap_or(0),
                lessons.get(&course.id).copied().unwrap_or(0),
            )
        })
        .collect())
}

pub struct CourseService {
    store: Arc<dyn LmsStore>,
}

impl CourseService {
    pub fn new(store: Arc<dyn LmsStore>) -> Self {
        Self { store }
    }

    async fn cards(&self, courses: &[Course]) -> ServiceResult<Vec<CourseCard>> {
        Ok(course_cards(self.store.as_ref(), courses).await?)
    }

    async fn active_course(&self, course_id: &str) -> ServiceResult<Course> {
        let id = parse_id(course_id, "Course")?;
        match self.store.find_course(id).await? {
            Some(course) if course.is_active => Ok(course),
            _ => Err(ServiceError::not_found("Course not found")),
        }
    }

    /// Courses are only visible to their own instructor for management.
    async fn owned_course(&self, caller: &Caller, course_id: &str) -> ServiceResult<Course> {
        let id = parse_id(course_id, "Course")?;
        match self.store.find_course(id).await? {
            Some(course) if course.instructor_id == caller.id => Ok(course),
            _ => Err(ServiceError::not_found("Course not found")),
        }
    }

    pub async fn catalog(&self, query: CatalogQuery) -> ServiceResult<CatalogResponse> {
        let level = query
            .level
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| raw.parse::<CourseLevel>().ok());
        let instructor = query
            .instructor
            .as_deref()
            .and_then(|raw| ObjectId::parse_str(raw.trim()).ok());
        let text = query
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        let courses = self
            .store
            .list_courses(&CourseFilter {
                active: Some(true),
                instructor,
                level,
                text,
                ..Default::default()
            })
            .await?;

        let sort = CatalogSort::parse(query.sort.as_deref());
        let mut cards = self.cards(&courses).await?;
        sort_cards(&mut cards, sort);

        let stats = CatalogStats {
            total_courses: self
                .store
                .count_courses(&CourseFilter {
                    active: Some(true),
                    ..Default::default()
                })
                .await?,
            total_instructors: self
                .store
                .count_users(&UserFilter {
                    role: Some(UserRole::Teacher),
                    active_only: true,
                })
                .await?,
            levels: CourseLevel::ALL.into_iter().map(LevelChoice::from).collect(),
        };

        Ok(CatalogResponse {
            courses: Page::paginate(cards, query.page.as_deref(), COURSES_PER_PAGE),
            stats,
            current_sort: sort,
        })
    }

    pub async fn detail(
        &self,
        caller: Option<&Caller>,
        course_id: &str,
    ) -> ServiceResult<CourseDetailResponse> {
        let course = self.active_course(course_id).await?;

        let enrollment = match caller {
            Some(caller) => self.store.find_enrollment(caller.id, course.id).await?,
            None => None,
        };

        let lessons = self.store.list_lessons(course.id).await?;
        let total_duration = lessons.iter().map(|l| u64::from(l.duration_minutes)).sum();

        let others: Vec<Course> = self
            .store
            .list_courses(&CourseFilter {
                active: Some(true),
                instructor: Some(course.instructor_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|c| c.id != course.id)
            .take(OTHER_COURSES)
            .collect();

        let mut card = self.cards(std::slice::from_ref(&course)).await?;
        let card = card
            .pop()
            .ok_or_else(|| ServiceError::not_found("Course not found"))?;

        Ok(CourseDetailResponse {
            total_students: card.student_count,
            total_lessons: lessons.len() as u64,
            total_duration,
            course: card,
            lessons: lessons.iter().map(LessonSummary::from).collect(),
            is_enrolled: enrollment.is_some(),
            enrollment: enrollment.as_ref().map(EnrollmentView::from),
            instructor_other_courses: self.cards(&others).await?,
        })
    }

    pub async fn enroll(&self, caller: &Caller, course_id: &str) -> ServiceResult<EnrollmentView> {
        let course = self.active_course(course_id).await?;
        require_role(caller, UserRole::Student, "Only students can enroll in courses")?;

        if self.store.find_enrollment(caller.id, course.id).await?.is_some() {
            return Err(ServiceError::conflict("You are already enrolled in this course"));
        }

        let enrollment = Enrollment::new(caller.id, course.id);
        self.store.insert_enrollment(&enrollment).await.map_err(|e| match e {
            StoreError::Duplicate(_) => {
                ServiceError::conflict("You are already enrolled in this course")
            }
            other => other.into(),
        })?;

        ENROLLMENTS_TOTAL.inc();
        tracing::info!("Student {} enrolled in course {}", caller.id, course.id);

        Ok(EnrollmentView::from(&enrollment))
    }

    pub async fn my_courses(
        &self,
        caller: &Caller,
        query: StatusQuery,
    ) -> ServiceResult<MyCoursesResponse> {
        match caller.role {
            UserRole::Student => Ok(MyCoursesResponse::Student(
                self.student_courses(caller, query).await?,
            )),
            UserRole::Teacher => Ok(MyCoursesResponse::Instructor(
                self.instructor_courses(caller, query).await?,
            )),
            UserRole::Admin => Err(ServiceError::forbidden("You have no courses")),
        }
    }

    async fn student_courses(
        &self,
        caller: &Caller,
        query: StatusQuery,
    ) -> ServiceResult<StudentCoursesResponse> {
        let status = query.status.unwrap_or_else(|| "all".to_string());
        let is_completed = match status.as_str() {
            "active" => Some(false),
            "completed" => Some(true),
            _ => None,
        };

        let enrollments = self
            .store
            .list_enrollments(&EnrollmentFilter {
                student: Some(caller.id),
                is_completed,
                ..Default::default()
            })
            .await?;

        let page = Page::paginate(enrollments, query.page.as_deref(), COURSES_PER_PAGE);

        let mut courses = Vec::with_capacity(page.items.len());
        for enrollment in &page.items {
            if let Some(course) = self.store.find_course(enrollment.course_id).await? {
                courses.push(course);
            }
        }
        let cards: HashMap<String, CourseCard> = self
            .cards(&courses)
            .await?
            .into_iter()
            .map(|card| (card.id.clone(), card))
            .collect();

        let enrollments = Page {
            items: page
                .items
                .iter()
                .filter_map(|enrollment| {
                    cards
                        .get(&enrollment.course_id.to_hex())
                        .map(|card| EnrolledCourse {
                            enrollment: EnrollmentView::from(enrollment),
                            course: card.clone(),
                        })
                })
                .collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages,
        };

        Ok(StudentCoursesResponse {
            enrollments,
            current_status: status,
        })
    }

    pub async fn instructor_courses(
        &self,
        caller: &Caller,
        query: StatusQuery,
    ) -> ServiceResult<InstructorCoursesResponse> {
        require_role(caller, UserRole::Teacher, "This page is for teachers only")?;

        let status = query.status.unwrap_or_else(|| "all".to_string());
        let active = match status.as_str() {
            "active" => Some(true),
            "inactive" => Some(false),
            _ => None,
        };

        let courses = self
            .store
            .list_courses(&CourseFilter {
                instructor: Some(caller.id),
                active,
                ..Default::default()
            })
            .await?;

        let all_ids: Vec<ObjectId> = self
            .store
            .list_courses(&CourseFilter {
                instructor: Some(caller.id),
                ..Default::default()
            })
            .await?
            .iter()
            .map(|c| c.id)
            .collect();
        let total_students = self
            .store
            .count_enrollments_by_course(&all_ids)
            .await?
            .values()
            .sum();

        let stats = InstructorStats {
            total_courses: courses.len() as u64,
            active_courses: courses.iter().filter(|c| c.is_active).count() as u64,
            total_students,
        };

        let cards = self.cards(&courses).await?;

        Ok(InstructorCoursesResponse {
            courses: Page::paginate(cards, query.page.as_deref(), COURSES_PER_PAGE),
            stats,
            current_status: status,
        })
    }

    pub async fn create(
        &self,
        caller: &Caller,
        req: CreateCourseRequest,
    ) -> ServiceResult<CourseCard> {
        require_role(caller, UserRole::Teacher, "Only teachers can create courses")?;
        req.validate()?;

        let course = Course {
            id: ObjectId::new(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            instructor_id: caller.id,
            level: req.level,
            duration_weeks: req.duration_weeks,
            price: req.price,
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.insert_course(&course).await?;

        tracing::info!("Course created: {} by {}", course.id, caller.id);
        self.card(&course).await
    }

    pub async fn update(
        &self,
        caller: &Caller,
        course_id: &str,
        req: UpdateCourseRequest,
    ) -> ServiceResult<CourseCard> {
        let mut course = self.owned_course(caller, course_id).await?;
        req.validate()?;

        course.title = req.title.trim().to_string();
        course.description = req.description.trim().to_string();
        course.level = req.level;
        course.duration_weeks = req.duration_weeks;
        course.price = req.price;
        if let Some(is_active) = req.is_active {
            course.is_active = is_active;
        }
        self.store.update_course(&course).await?;

        tracing::info!("Course updated: {}", course.id);
        self.card(&course).await
    }

    /// Soft delete; enrollments and lessons are kept.
    pub async fn delete(&self, caller: &Caller, course_id: &str) -> ServiceResult<ApiMessage> {
        let mut course = self.owned_course(caller, course_id).await?;
        course.is_active = false;
        self.store.update_course(&course).await?;

        tracing::info!("Course deactivated: {}", course.id);
        Ok(ApiMessage::ok(format!("Course \"{}\" was deleted", course.title)))
    }

    pub async fn toggle_status(&self, caller: &Caller, course_id: &str) -> ServiceResult<CourseCard> {
        let mut course = self.owned_course(caller, course_id).await?;
        course.is_active = !course.is_active;
        self.store.update_course(&course).await?;

        tracing::info!("Course {} is_active={}", course.id, course.is_active);
        self.card(&course).await
    }

    pub async fn by_level(&self, level: &str, query: PageQuery) -> ServiceResult<LevelCoursesResponse> {
        let level: CourseLevel = level
            .parse()
            .map_err(|_| ServiceError::bad_request("Invalid course level"))?;

        let courses = self
            .store
            .list_courses(&CourseFilter {
                active: Some(true),
                level: Some(level),
                ..Default::default()
            })
            .await?;
        let cards = self.cards(&courses).await?;

        Ok(LevelCoursesResponse {
            level,
            level_display: level.label(),
            courses: Page::paginate(cards, query.page.as_deref(), COURSES_PER_PAGE),
        })
    }

    async fn card(&self, course: &Course) -> ServiceResult<CourseCard> {
        self.cards(std::slice::from_ref(course))
            .await?
            .pop()
            .ok_or_else(|| ServiceError::not_found("Course not found"))
    }
}

/// Input is newest first; the stable sort keeps that as the tiebreak.
fn sort_cards(cards: &mut [CourseCard], sort: CatalogSort) {
    match sort {
        CatalogSort::Newest => {}
        CatalogSort::Popular => cards.sort_by(|a, b| b.student_count.cmp(&a.student_count)),
        CatalogSort::Alphabetical => cards.sort_by(|a, b| a.title.cmp(&b.title)),
        CatalogSort::PriceLow => cards.sort_by(|a, b| a.price.total_cmp(&b.price)),
        CatalogSort::PriceHigh => cards.sort_by(|a, b| b.price.total_cmp(&a.price)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn teacher() -> Caller {
        Caller {
            id: ObjectId::new(),
            role: UserRole::Teacher,
        }
    }

    fn student() -> Caller {
        Caller {
            id: ObjectId::new(),
            role: UserRole::Student,
        }
    }

    fn request(title: &str, price: f64) -> CreateCourseRequest {
        CreateCourseRequest {
            title: title.to_string(),
            description: "A long enough description of the course content for validation.".to_string(),
            level: CourseLevel::Beginner,
            duration_weeks: 6,
            price,
        }
    }

    #[tokio::test]
    async fn only_teachers_create_courses() {
        let service = CourseService::new(Arc::new(MemoryStore::new()));
        let err = service
            .create(&student(), request("Rust for beginners", 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let card = service
            .create(&teacher(), request("Rust for beginners", 0.0))
            .await
            .unwrap();
        assert!(card.is_active);
        assert_eq!(card.student_count, 0);
    }

    #[tokio::test]
    async fn enroll_twice_conflicts() {
        let service = CourseService::new(Arc::new(MemoryStore::new()));
        let owner = teacher();
        let card = service
            .create(&owner, request("Async Rust in practice", 10.0))
            .await
            .unwrap();

        let learner = student();
        let enrollment = service.enroll(&learner, &card.id).await.unwrap();
        assert_eq!(enrollment.progress, 0);
        assert!(!enrollment.is_completed);

        let err = service.enroll(&learner, &card.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = service.enroll(&owner, &card.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn catalog_hides_inactive_and_sorts_by_price() {
        let service = CourseService::new(Arc::new(MemoryStore::new()));
        let owner = teacher();
        let cheap = service.create(&owner, request("Cheap course title", 5.0)).await.unwrap();
        service.create(&owner, request("Pricey course title", 50.0)).await.unwrap();
        let hidden = service.create(&owner, request("Hidden course title", 1.0)).await.unwrap();
        service.delete(&owner, &hidden.id).await.unwrap();

        let catalog = service
            .catalog(CatalogQuery {
                sort: Some("price_low".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = catalog.courses.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(catalog.courses.total, 2);
        assert_eq!(ids[0], cheap.id);
        assert_eq!(catalog.stats.total_courses, 2);
        assert_eq!(catalog.current_sort, CatalogSort::PriceLow);

        let search = service
            .catalog(CatalogQuery {
                query: Some("PRICEY".to_string()),
                level: Some("expert".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(search.courses.total, 1);
    }

    #[tokio::test]
    async fn non_owner_cannot_toggle() {
        let service = CourseService::new(Arc::new(MemoryStore::new()));
        let card = service
            .create(&teacher(), request("Ownership explained", 0.0))
            .await
            .unwrap();

        let err = service.toggle_status(&teacher(), &card.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_level_is_bad_request() {
        let service = CourseService::new(Arc::new(MemoryStore::new()));
        let err = service.by_level("expert", PageQuery::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }
}
