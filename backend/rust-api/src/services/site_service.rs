use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use super::auth_service::normalize_email;
use super::course_service::course_cards;
use super::ServiceResult;
use crate::metrics::NEWSLETTER_SUBSCRIPTIONS_TOTAL;
use crate::models::lesson::{CourseRef, LessonSummary};
use crate::models::newsletter::{
    HomeResponse, HomeStats, LessonHit, NewsletterSubscriber, SearchQuery, SearchResponse,
    SubscribeRequest,
};
use crate::models::user::UserRole;
use crate::models::ApiMessage;
use crate::store::{CourseFilter, LmsStore, StoreError, UserFilter};

const FEATURED_COURSES: usize = 6;
const SEARCH_LIMIT: usize = 10;

pub struct SiteService {
    store: Arc<dyn LmsStore>,
}

impl SiteService {
    pub fn new(store: Arc<dyn LmsStore>) -> Self {
        Self { store }
    }

    pub async fn home(&self) -> ServiceResult<HomeResponse> {
        let active = CourseFilter {
            active: Some(true),
            ..Default::default()
        };
        let courses = self.store.list_courses(&active).await?;

        let mut featured = course_cards(self.store.as_ref(), &courses).await?;
        featured.sort_by(|a, b| b.student_count.cmp(&a.student_count));
        featured.truncate(FEATURED_COURSES);

        let stats = HomeStats {
            total_courses: courses.len() as u64,
            total_students: self
                .store
                .count_users(&UserFilter {
                    role: Some(UserRole::Student),
                    active_only: true,
                })
                .await?,
            total_teachers: self
                .store
                .count_users(&UserFilter {
                    role: Some(UserRole::Teacher),
                    active_only: true,
                })
                .await?,
            total_lessons: self.store.count_lessons().await?,
        };

        Ok(HomeResponse {
            featured_courses: featured,
            stats,
        })
    }

    /// Blank queries return no results.
    pub async fn search(&self, query: SearchQuery) -> ServiceResult<SearchResponse> {
        let q = query.q.unwrap_or_default().trim().to_string();
        if q.is_empty() {
            return Ok(SearchResponse {
                query: q,
                courses: Vec::new(),
                lessons: Vec::new(),
                total_results: 0,
            });
        }

        let courses = self
            .store
            .list_courses(&CourseFilter {
                active: Some(true),
                title: Some(q.clone()),
                ..Default::default()
            })
            .await?;
        let lessons = self.store.search_lessons(&q).await?;
        let total_results = (courses.len() + lessons.len()) as u64;

        let shown = &courses[..courses.len().min(SEARCH_LIMIT)];
        let cards = course_cards(self.store.as_ref(), shown).await?;

        let mut titles: HashMap<ObjectId, Option<String>> = HashMap::new();
        let mut hits = Vec::new();
        for lesson in lessons.iter().take(SEARCH_LIMIT) {
            if !titles.contains_key(&lesson.course_id) {
                let title = self.store.find_course(lesson.course_id).await?.map(|c| c.title);
                titles.insert(lesson.course_id, title);
            }
            if let Some(Some(title)) = titles.get(&lesson.course_id) {
                hits.push(LessonHit {
                    lesson: LessonSummary::from(lesson),
                    course: CourseRef {
                        id: lesson.course_id.to_hex(),
                        title: title.clone(),
                    },
                });
            }
        }

        tracing::debug!("Search '{}' matched {} results", q, total_results);
        Ok(SearchResponse {
            query: q,
            courses: cards,
            lessons: hits,
            total_results,
        })
    }

    /// Refusals are reported in the envelope rather than as errors.
    pub async fn subscribe(&self, mut req: SubscribeRequest) -> ServiceResult<ApiMessage> {
        req.email = normalize_email(&req.email);
        if req.email.is_empty() || req.validate().is_err() {
            NEWSLETTER_SUBSCRIPTIONS_TOTAL.with_label_values(&["invalid"]).inc();
            return Ok(ApiMessage::fail("Invalid email address"));
        }

        let outcome = match self.store.find_subscriber(&req.email).await? {
            Some(existing) if existing.is_active => {
                ("duplicate", ApiMessage::fail("You are already subscribed"))
            }
            Some(existing) => {
                self.store.set_subscriber_active(existing.id, true).await?;
                ("reactivated", ApiMessage::ok("Your subscription has been reactivated"))
            }
            None => {
                let subscriber = NewsletterSubscriber {
                    id: ObjectId::new(),
                    email: req.email.clone(),
                    is_active: true,
                    subscribed_at: Utc::now(),
                };
                match self.store.insert_subscriber(&subscriber).await {
                    Ok(()) => ("subscribed", ApiMessage::ok("Successfully subscribed")),
                    // Lost a race with a concurrent subscribe for the same address.
                    Err(StoreError::Duplicate(_)) => {
                        ("duplicate", ApiMessage::fail("You are already subscribed"))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        NEWSLETTER_SUBSCRIPTIONS_TOTAL.with_label_values(&[outcome.0]).inc();
        tracing::info!("Newsletter subscribe for {}: {}", req.email, outcome.0);
        Ok(outcome.1)
    }
}
