use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::community::MemberRole;
use crate::models::quiz::QuizAttempt;
use crate::models::user::{
    ProfileAttempt, ProfileCommunity, ProfileQuiz, ProfileResponse, ProfileUpdate,
    UpdateProfileRequest, User, UserProfile, UserStats, UserSummary,
};
use crate::services::community_service::relation_from;
use crate::services::storage::{store_image, FileStorage};
use crate::store::Repositories;

/// Folder names under the upload root
pub const AVATAR_FOLDER: &str = "avatars";
pub const BANNER_FOLDER: &str = "banners";

pub fn compute_stats(
    attempts: &[QuizAttempt],
    quizzes_created: usize,
    communities_joined: usize,
) -> UserStats {
    let quizzes_taken = attempts
        .iter()
        .map(|a| a.quiz_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let (average_percentage, best_percentage) = if attempts.is_empty() {
        (0.0, 0.0)
    } else {
        let sum: f64 = attempts.iter().map(|a| a.percentage).sum();
        let best = attempts
            .iter()
            .map(|a| a.percentage)
            .fold(0.0_f64, f64::max);
        (sum / attempts.len() as f64, best)
    };

    UserStats {
        total_attempts: attempts.len(),
        quizzes_taken,
        average_percentage,
        best_percentage,
        quizzes_created,
        communities_joined,
    }
}

pub struct UserService {
    repos: Repositories,
    storage: Arc<dyn FileStorage>,
}

impl UserService {
    pub fn new(repos: Repositories, storage: Arc<dyn FileStorage>) -> Self {
        Self { repos, storage }
    }

    async fn load(&self, id: &str) -> AppResult<User> {
        self.repos
            .users
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn profile(&self, user_id: &str) -> AppResult<ProfileResponse> {
        let user = self.load(user_id).await?;
        let communities = self.profile_communities(user_id).await?;
        let attempts = self.repos.quizzes.attempts_for_user(user_id).await?;
        let stats = self.stats_from(user_id, &attempts).await?;

        let mut quizzes = HashMap::new();
        let mut profile_attempts = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            if !quizzes.contains_key(&attempt.quiz_id) {
                let quiz = self.repos.quizzes.find_quiz(&attempt.quiz_id).await?;
                quizzes.insert(attempt.quiz_id.clone(), quiz);
            }
            // Attempts on deleted quizzes are gone with the cascade; skip stragglers
            let Some(Some(quiz)) = quizzes.get(&attempt.quiz_id) else {
                continue;
            };
            profile_attempts.push(ProfileAttempt {
                quiz: ProfileQuiz {
                    id: quiz.id.clone(),
                    title: quiz.title.clone(),
                    questions_count: attempt.total_questions,
                },
                attempt_id: attempt.id,
                score: attempt.score,
                percentage: attempt.percentage,
                time_taken_minutes: attempt.time_taken_minutes,
                attempt_number: attempt.attempt_number,
                completed_at: attempt.completed_at,
            });
        }

        Ok(ProfileResponse {
            user: UserProfile::from(user),
            communities,
            attempts: profile_attempts,
            stats,
        })
    }

    pub async fn stats(&self, user_id: &str) -> AppResult<UserStats> {
        self.load(user_id).await?;
        let attempts = self.repos.quizzes.attempts_for_user(user_id).await?;
        self.stats_from(user_id, &attempts).await
    }

    async fn stats_from(&self, user_id: &str, attempts: &[QuizAttempt]) -> AppResult<UserStats> {
        let quizzes_created = self.repos.quizzes.list_quizzes_by_creator(user_id).await?.len();
        let communities_joined = self
            .repos
            .communities
            .memberships_of(user_id)
            .await?
            .iter()
            .filter(|m| m.member_role() != MemberRole::Creator)
            .count();
        Ok(compute_stats(attempts, quizzes_created, communities_joined))
    }

    async fn profile_communities(&self, user_id: &str) -> AppResult<Vec<ProfileCommunity>> {
        let memberships = self.repos.communities.memberships_of(user_id).await?;
        let mut result = Vec::with_capacity(memberships.len());

        for membership in memberships {
            let Some(community) = self
                .repos
                .communities
                .find_community(&membership.community_id)
                .await?
            else {
                continue;
            };
            let member_count = self.repos.communities.list_members(&community.id).await?.len();
            let number_of_quizzes = self
                .repos
                .quizzes
                .list_community_quizzes(&community.id)
                .await?
                .len();
            let creator = self
                .repos
                .users
                .find_user(&community.creator_id)
                .await?
                .map(|u| UserSummary::from(&u));

            result.push(ProfileCommunity {
                role: relation_from(&community, Some(user_id), Some(&membership)),
                id: community.id,
                name: community.name,
                number_of_quizzes,
                member_count,
                creator,
                joined_at: membership.joined_at,
            });
        }
        Ok(result)
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        req: UpdateProfileRequest,
    ) -> AppResult<UserProfile> {
        req.validate()?;
        let mut update = ProfileUpdate::from(req);
        if let Some(username) = update.username.take() {
            let username = username.trim().to_string();
            if username.is_empty() {
                return Err(AppError::validation("Username cannot be empty"));
            }
            update.username = Some(username);
        }
        self.apply(user_id, update).await
    }

    pub async fn update_avatar(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> AppResult<String> {
        let url = store_image(self.storage.as_ref(), AVATAR_FOLDER, file_name, bytes).await?;
        self.apply(
            user_id,
            ProfileUpdate {
                avatar: Some(url.clone()),
                ..ProfileUpdate::default()
            },
        )
        .await?;
        Ok(url)
    }

    pub async fn update_banner(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> AppResult<String> {
        let url = store_image(self.storage.as_ref(), BANNER_FOLDER, file_name, bytes).await?;
        self.apply(
            user_id,
            ProfileUpdate {
                banner: Some(url.clone()),
                ..ProfileUpdate::default()
            },
        )
        .await?;
        Ok(url)
    }

    async fn apply(&self, user_id: &str, update: ProfileUpdate) -> AppResult<UserProfile> {
        let user = self
            .repos
            .users
            .update_profile(user_id, &update)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        tracing::info!(user_id, "Profile updated");
        Ok(UserProfile::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(quiz: &str, percentage: f64) -> QuizAttempt {
        QuizAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            quiz_id: quiz.to_string(),
            user_id: "u1".to_string(),
            score: 0,
            total_questions: 4,
            percentage,
            time_taken_minutes: 1,
            attempt_number: 1,
            completed_at: None,
        }
    }

    #[test]
    fn test_compute_stats() {
        let attempts = vec![
            attempt("q1", 50.0),
            attempt("q1", 100.0),
            attempt("q2", 75.0),
        ];
        let stats = compute_stats(&attempts, 2, 1);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.quizzes_taken, 2);
        assert_eq!(stats.average_percentage, 75.0);
        assert_eq!(stats.best_percentage, 100.0);
        assert_eq!(stats.quizzes_created, 2);
        assert_eq!(stats.communities_joined, 1);
    }

    #[test]
    fn test_compute_stats_without_attempts() {
        assert_eq!(compute_stats(&[], 0, 0), UserStats::default());
    }
}
