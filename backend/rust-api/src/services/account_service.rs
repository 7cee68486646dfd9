use anyhow::Context;
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use super::course_service::course_cards;
use super::quiz_service::result_rows;
use super::{parse_id, round1, ServiceError, ServiceResult};
use crate::models::course::{Enrollment, EnrollmentView};
use crate::models::dashboard::{
    AdminDashboardStats, DashboardResponse, EnrollmentRow, PublicProfileResponse,
    StudentDashboardStats, TeacherDashboardStats,
};
use crate::models::lesson::CourseRef;
use crate::models::user::{
    normalize_phone, Caller, ChangePasswordRequest, Profile, ProfileResponse,
    UpdateProfileRequest, User, UserProfile, UserRole, UserSummary,
};
use crate::models::ApiMessage;
use crate::store::{
    AttemptFilter, CourseFilter, EnrollmentFilter, LmsStore, StoreError, UserFilter,
};

const PUBLIC_PROFILE_COURSES: usize = 6;

pub struct AccountService {
    store: Arc<dyn LmsStore>,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(store: Arc<dyn LmsStore>, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    /// Tokens outlive deactivation, so every account page re-checks the flag.
    async fn active_user(&self, caller: &Caller) -> ServiceResult<User> {
        match self.store.find_user(caller.id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(ServiceError::Unauthorized(
                "Account not found or deactivated".to_string(),
            )),
        }
    }

    async fn profile_for(&self, user_id: ObjectId) -> ServiceResult<Profile> {
        if let Some(profile) = self.store.find_profile(user_id).await? {
            return Ok(profile);
        }

        let profile = Profile::empty_for(user_id);
        match self.store.insert_profile(&profile).await {
            Ok(()) => {
                tracing::debug!("Created missing profile for user {}", user_id);
                Ok(profile)
            }
            // Another request created it first.
            Err(StoreError::Duplicate(_)) => self
                .store
                .find_profile(user_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Profile not found")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn me(&self, caller: &Caller) -> ServiceResult<UserProfile> {
        Ok(self.active_user(caller).await?.into())
    }

    pub async fn profile(&self, caller: &Caller) -> ServiceResult<ProfileResponse> {
        let user = self.active_user(caller).await?;
        let profile = self.profile_for(user.id).await?;
        Ok(ProfileResponse {
            user: user.into(),
            bio: profile.bio,
            profile_created_at: profile.created_at,
        })
    }

    pub async fn update_profile(
        &self,
        caller: &Caller,
        req: UpdateProfileRequest,
    ) -> ServiceResult<ProfileResponse> {
        req.validate()?;

        let mut user = self.active_user(caller).await?;
        let mut profile = self.profile_for(user.id).await?;

        if let Some(first_name) = req.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(phone) = req.phone {
            user.phone = if phone.trim().is_empty() {
                String::new()
            } else {
                normalize_phone(&phone).map_err(|e| {
                    ServiceError::field("phone", e.message.unwrap_or_default().to_string())
                })?
            };
        }
        if req.birth_date.is_some() {
            user.birth_date = req.birth_date;
        }

        self.store.update_user(&user).await?;

        if let Some(bio) = req.bio {
            profile.bio = bio;
            self.store.update_profile(&profile).await?;
        }

        tracing::info!("Profile updated for user {}", user.id);

        Ok(ProfileResponse {
            user: user.into(),
            bio: profile.bio,
            profile_created_at: profile.created_at,
        })
    }

    pub async fn change_password(
        &self,
        caller: &Caller,
        req: ChangePasswordRequest,
    ) -> ServiceResult<ApiMessage> {
        let mut user = self.active_user(caller).await?;

        let old_matches = bcrypt::verify(&req.old_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !old_matches {
            return Err(ServiceError::field(
                "old_password",
                "Your old password was entered incorrectly",
            ));
        }

        req.validate()?;

        user.password_hash =
            bcrypt::hash(&req.new_password1, self.bcrypt_cost).context("Failed to hash password")?;
        self.store.update_user(&user).await?;

        tracing::info!("Password changed for user {}", user.id);
        Ok(ApiMessage::ok("Password changed successfully"))
    }

    /// Soft delete: the account stays but can no longer log in.
    pub async fn deactivate(&self, caller: &Caller) -> ServiceResult<ApiMessage> {
        let mut user = self.active_user(caller).await?;
        user.is_active = false;
        self.store.update_user(&user).await?;

        tracing::info!("Account deactivated: {}", user.id);
        Ok(ApiMessage::ok("Your account has been deleted"))
    }

    pub async fn public_profile(&self, user_id: &str) -> ServiceResult<PublicProfileResponse> {
        let id = parse_id(user_id, "User")?;
        let user = match self.store.find_user(id).await? {
            Some(user) if user.is_active => user,
            _ => return Err(ServiceError::not_found("User not found")),
        };

        let bio = self.store.find_profile(id).await?.map(|p| p.bio);

        let courses = match user.role {
            UserRole::Teacher => {
                let mut courses = self
                    .store
                    .list_courses(&CourseFilter {
                        active: Some(true),
                        instructor: Some(id),
                        ..Default::default()
                    })
                    .await?;
                courses.truncate(PUBLIC_PROFILE_COURSES);
                Some(course_cards(self.store.as_ref(), &courses).await?)
            }
            UserRole::Student | UserRole::Admin => None,
        };

        Ok(PublicProfileResponse {
            user: UserSummary::from(&user),
            bio,
            courses,
        })
    }

    pub async fn dashboard(&self, caller: &Caller) -> ServiceResult<DashboardResponse> {
        let user = self.active_user(caller).await?;
        match user.role {
            UserRole::Student => self.student_dashboard(user.id).await,
            UserRole::Teacher => self.teacher_dashboard(user.id).await,
            UserRole::Admin => self.admin_dashboard().await,
        }
    }

    async fn student_dashboard(&self, student: ObjectId) -> ServiceResult<DashboardResponse> {
        let enrollments = self
            .store
            .list_enrollments(&EnrollmentFilter {
                student: Some(student),
                ..Default::default()
            })
            .await?;
        let completed_lessons = self.store.count_completed_progress(student, None).await?;
        let attempts = self
            .store
            .list_attempts(&AttemptFilter {
                student: Some(student),
                ..Default::default()
            })
            .await?;

        let completed_courses = enrollments.iter().filter(|e| e.is_completed).count() as u64;
        let average_score = if attempts.is_empty() {
            0.0
        } else {
            let sum: u64 = attempts.iter().map(|a| u64::from(a.score)).sum();
            round1(sum as f64 / attempts.len() as f64)
        };

        let stats = StudentDashboardStats {
            total_courses: enrollments.len() as u64,
            active_courses: enrollments.len() as u64 - completed_courses,
            completed_courses,
            completed_lessons,
            quiz_attempts: attempts.len() as u64,
            average_score,
        };

        let recent_enrollments = self.enrollment_rows(&enrollments[..enrollments.len().min(5)], false).await?;
        let recent_quiz_attempts =
            result_rows(self.store.as_ref(), &attempts[..attempts.len().min(5)]).await?;

        Ok(DashboardResponse::Student {
            stats,
            recent_enrollments,
            recent_quiz_attempts,
        })
    }

    async fn teacher_dashboard(&self, teacher: ObjectId) -> ServiceResult<DashboardResponse> {
        let courses = self
            .store
            .list_courses(&CourseFilter {
                instructor: Some(teacher),
                ..Default::default()
            })
            .await?;
        let course_ids: Vec<ObjectId> = courses.iter().map(|c| c.id).collect();

        let enrollments = self
            .store
            .list_enrollments(&EnrollmentFilter {
                courses: Some(course_ids.clone()),
                ..Default::default()
            })
            .await?;
        let total_lessons: u64 = self
            .store
            .count_lessons_by_course(&course_ids)
            .await?
            .values()
            .sum();

        let stats = TeacherDashboardStats {
            total_courses: courses.len() as u64,
            active_courses: courses.iter().filter(|c| c.is_active).count() as u64,
            total_students: enrollments.len() as u64,
            total_lessons,
        };

        let my_courses = course_cards(self.store.as_ref(), &courses[..courses.len().min(5)]).await?;
        let recent_enrollments = self
            .enrollment_rows(&enrollments[..enrollments.len().min(10)], true)
            .await?;

        Ok(DashboardResponse::Teacher {
            stats,
            my_courses,
            recent_enrollments,
        })
    }

    async fn admin_dashboard(&self) -> ServiceResult<DashboardResponse> {
        let count_role = |role| UserFilter {
            role: Some(role),
            active_only: false,
        };

        let stats = AdminDashboardStats {
            total_users: self.store.count_users(&UserFilter::default()).await?,
            total_students: self.store.count_users(&count_role(UserRole::Student)).await?,
            total_teachers: self.store.count_users(&count_role(UserRole::Teacher)).await?,
            total_courses: self.store.count_courses(&CourseFilter::default()).await?,
        };

        Ok(DashboardResponse::Admin { stats })
    }

    async fn enrollment_rows(
        &self,
        enrollments: &[Enrollment],
        with_student: bool,
    ) -> ServiceResult<Vec<EnrollmentRow>> {
        let students: HashMap<ObjectId, UserSummary> = if with_student {
            let ids: Vec<ObjectId> = enrollments.iter().map(|e| e.student_id).collect();
            self.store
                .find_users(&ids)
                .await?
                .iter()
                .map(|u| (u.id, UserSummary::from(u)))
                .collect()
        } else {
            HashMap::new()
        };

        let mut rows = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            let Some(course) = self.store.find_course(enrollment.course_id).await? else {
                continue;
            };
            rows.push(EnrollmentRow {
                enrollment: EnrollmentView::from(enrollment),
                course: CourseRef {
                    id: course.id.to_hex(),
                    title: course.title,
                },
                student: students.get(&enrollment.student_id).cloned(),
            });
        }
        Ok(rows)
    }
}
