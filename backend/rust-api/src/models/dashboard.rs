use serde::Serialize;

use super::course::{CourseCard, EnrollmentView};
use super::lesson::CourseRef;
use super::quiz::ResultRow;
use super::user::UserSummary;

#[derive(Debug, Serialize)]
pub struct StudentDashboardStats {
    pub total_courses: u64,
    pub active_courses: u64,
    pub completed_courses: u64,
    pub completed_lessons: u64,
    pub quiz_attempts: u64,
    pub average_score: f64,
}

#[derive(Debug, Serialize)]
pub struct TeacherDashboardStats {
    pub total_courses: u64,
    pub active_courses: u64,
    pub total_students: u64,
    pub total_lessons: u64,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboardStats {
    pub total_users: u64,
    pub total_students: u64,
    pub total_teachers: u64,
    pub total_courses: u64,
}

/// Enrollment with the course it belongs to and, for instructors, the student.
#[derive(Debug, Serialize)]
pub struct EnrollmentRow {
    pub enrollment: EnrollmentView,
    pub course: CourseRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "user_role", rename_all = "snake_case")]
pub enum DashboardResponse {
    Student {
        stats: StudentDashboardStats,
        recent_enrollments: Vec<EnrollmentRow>,
        recent_quiz_attempts: Vec<ResultRow>,
    },
    Teacher {
        stats: TeacherDashboardStats,
        my_courses: Vec<CourseCard>,
        recent_enrollments: Vec<EnrollmentRow>,
    },
    Admin {
        stats: AdminDashboardStats,
    },
}

#[derive(Debug, Serialize)]
pub struct PublicProfileResponse {
    pub user: UserSummary,
    pub bio: Option<String>,
    /// Only present for teachers.
    pub courses: Option<Vec<CourseCard>>,
}
