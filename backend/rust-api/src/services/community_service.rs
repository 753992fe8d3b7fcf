use chrono::Utc;
use std::collections::HashMap;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::metrics::COMMUNITY_MEMBERSHIP_TOGGLES_TOTAL;
use crate::models::community::{
    Community, CommunityDetail, CommunityMember, CommunityQuizView, CommunityRelation,
    CommunityUpdate, CommunityView, CreateCommunityRequest, MemberRole, MemberView,
    MembershipStatus, UpdateCommunityRequest,
};
use crate::models::user::{User, UserSummary};
use crate::store::Repositories;

/// Relationship of `user_id` to `community`.
///
/// The creator always resolves to `Creator`, whatever the membership rows say.
pub fn relation_from(
    community: &Community,
    user_id: Option<&str>,
    membership: Option<&CommunityMember>,
) -> CommunityRelation {
    match user_id {
        None => CommunityRelation::NonMember,
        Some(uid) if uid == community.creator_id => CommunityRelation::Creator,
        Some(_) => membership
            .map(|m| CommunityRelation::from(m.member_role()))
            .unwrap_or(CommunityRelation::NonMember),
    }
}

fn parse_assignable_role(value: &str) -> AppResult<MemberRole> {
    match value.trim().to_ascii_lowercase().as_str() {
        "admin" => Ok(MemberRole::Admin),
        "member" => Ok(MemberRole::Member),
        _ => Err(AppError::validation_code(
            "INVALID_ROLE",
            "Role must be 'admin' or 'member'",
        )),
    }
}

pub struct CommunityService {
    repos: Repositories,
}

impl CommunityService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    async fn load(&self, id: &str) -> AppResult<Community> {
        self.repos
            .communities
            .find_community(id)
            .await?
            .ok_or_else(|| AppError::not_found("Community not found"))
    }

    pub async fn resolve_relation(
        &self,
        community: &Community,
        user_id: Option<&str>,
    ) -> AppResult<CommunityRelation> {
        let membership = match user_id {
            Some(uid) if uid != community.creator_id => {
                self.repos
                    .communities
                    .find_member(&community.id, uid)
                    .await?
            }
            _ => None,
        };
        Ok(relation_from(community, user_id, membership.as_ref()))
    }

    pub async fn create(&self, user_id: &str, req: CreateCommunityRequest) -> AppResult<String> {
        req.validate()?;
        let now = Utc::now();
        let community = Community {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name.trim().to_string(),
            description: req.description,
            banner: req.banner,
            creator_id: user_id.to_string(),
            allow_public_quiz_submission: req.allow_public_quiz_submission,
            created_at: now,
            updated_at: now,
        };
        let creator = CommunityMember::new(&community.id, user_id, MemberRole::Creator);
        self.repos
            .communities
            .insert_community(&community, &creator)
            .await?;

        tracing::info!(community_id = %community.id, user_id, "Community created");
        Ok(community.id)
    }

    pub async fn list(&self, caller: Option<&str>) -> AppResult<Vec<CommunityView>> {
        let communities = self.repos.communities.list_communities().await?;
        let mut views = Vec::with_capacity(communities.len());
        for community in communities {
            views.push(self.build_view(community, caller).await?);
        }
        Ok(views)
    }

    pub async fn get(&self, id: &str, caller: Option<&str>) -> AppResult<CommunityDetail> {
        let community = self.load(id).await?;
        let quizzes = self
            .repos
            .quizzes
            .list_community_quizzes(&community.id)
            .await?;
        let liked = match caller {
            Some(uid) => self.repos.quizzes.liked_quiz_ids(uid).await?,
            None => Default::default(),
        };

        let creator_ids: Vec<String> = quizzes.iter().map(|q| q.creator_id.clone()).collect();
        let creators = self.users_by_id(&creator_ids).await?;

        let mut quiz_views = Vec::new();
        for quiz in quizzes.into_iter().filter(|q| q.is_published) {
            let questions_count = self.repos.quizzes.questions_for_quiz(&quiz.id).await?.len();
            quiz_views.push(CommunityQuizView {
                is_liked: liked.contains(&quiz.id),
                creator: creators.get(&quiz.creator_id).map(UserSummary::from),
                id: quiz.id,
                title: quiz.title,
                description: quiz.description,
                duration_minutes: quiz.duration_minutes,
                likes_count: quiz.likes_count,
                questions_count,
                created_at: quiz.created_at,
            });
        }

        Ok(CommunityDetail {
            community: self.build_view(community, caller).await?,
            quizzes: quiz_views,
        })
    }

    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        req: UpdateCommunityRequest,
    ) -> AppResult<CommunityView> {
        req.validate()?;
        let community = self.load(id).await?;
        if community.creator_id != user_id {
            return Err(AppError::forbidden(
                "Only the community creator can edit it",
            ));
        }
        let update = CommunityUpdate::from(req);
        let updated = self
            .repos
            .communities
            .update_community(id, &update)
            .await?
            .ok_or_else(|| AppError::not_found("Community not found"))?;

        tracing::info!(community_id = id, "Community updated");
        self.build_view(updated, Some(user_id)).await
    }

    pub async fn set_banner(&self, id: &str, user_id: &str, url: String) -> AppResult<()> {
        let community = self.load(id).await?;
        if community.creator_id != user_id {
            return Err(AppError::forbidden(
                "Only the community creator can edit it",
            ));
        }
        let update = CommunityUpdate {
            banner: Some(url),
            ..Default::default()
        };
        self.repos.communities.update_community(id, &update).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> AppResult<()> {
        let community = self.load(id).await?;
        if community.creator_id != user_id {
            return Err(AppError::forbidden(
                "Only the community creator can delete it",
            ));
        }
        if !self.repos.communities.delete_community(id).await? {
            return Err(AppError::not_found("Community not found"));
        }
        tracing::info!(community_id = id, "Community deleted");
        Ok(())
    }

    /// Joins when no membership row exists, leaves otherwise
    pub async fn toggle_membership(&self, id: &str, user_id: &str) -> AppResult<MembershipStatus> {
        let community = self.load(id).await?;
        if community.creator_id == user_id {
            return Err(AppError::validation_code(
                "CREATOR_MEMBERSHIP",
                "The creator cannot join or leave their own community",
            ));
        }

        let status = if self
            .repos
            .communities
            .find_member(id, user_id)
            .await?
            .is_some()
        {
            self.repos.communities.delete_member(id, user_id).await?;
            MembershipStatus::Left
        } else {
            let member = CommunityMember::new(id, user_id, MemberRole::Member);
            self.repos.communities.insert_member(&member).await?;
            MembershipStatus::Joined
        };

        let action = match status {
            MembershipStatus::Joined => "joined",
            MembershipStatus::Left => "left",
        };
        COMMUNITY_MEMBERSHIP_TOGGLES_TOTAL
            .with_label_values(&[action])
            .inc();
        tracing::info!(community_id = id, user_id, action, "Membership toggled");
        Ok(status)
    }

    pub async fn list_members(&self, id: &str) -> AppResult<Vec<MemberView>> {
        let community = self.load(id).await?;
        self.member_views(&community).await
    }

    pub async fn update_member_role(
        &self,
        id: &str,
        caller_id: &str,
        target_id: &str,
        role: &str,
    ) -> AppResult<()> {
        let community = self.load(id).await?;
        if community.creator_id != caller_id {
            return Err(AppError::forbidden(
                "Only the community creator can change roles",
            ));
        }
        if community.creator_id == target_id {
            return Err(AppError::forbidden("The creator's role cannot be changed"));
        }
        let role = parse_assignable_role(role)?;

        if !self
            .repos
            .communities
            .set_member_role(id, target_id, role)
            .await?
        {
            return Err(AppError::not_found("User is not a member of this community"));
        }
        tracing::info!(
            community_id = id,
            target_id,
            role = role.as_str(),
            "Member role updated"
        );
        Ok(())
    }

    /// Creator and admins always; members only when the community allows it
    pub async fn ensure_can_create_quiz(
        &self,
        community: &Community,
        user_id: &str,
    ) -> AppResult<()> {
        let relation = self.resolve_relation(community, Some(user_id)).await?;
        let allowed = relation.can_manage()
            || (relation == CommunityRelation::Member && community.allow_public_quiz_submission);
        if allowed {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "You are not allowed to create quizzes in this community",
            ))
        }
    }

    async fn users_by_id(&self, ids: &[String]) -> AppResult<HashMap<String, User>> {
        let mut unique: Vec<String> = ids.to_vec();
        unique.sort();
        unique.dedup();
        let users = self.repos.users.find_users(&unique).await?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    async fn member_views(&self, community: &Community) -> AppResult<Vec<MemberView>> {
        let members = self.repos.communities.list_members(&community.id).await?;
        let ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
        let users = self.users_by_id(&ids).await?;
        Ok(members
            .into_iter()
            .filter_map(|m| {
                let user = users.get(&m.user_id)?;
                let role = if m.user_id == community.creator_id {
                    MemberRole::Creator
                } else {
                    m.member_role()
                };
                Some(MemberView {
                    user: UserSummary::from(user),
                    role,
                    joined_at: m.joined_at,
                })
            })
            .collect())
    }

    async fn build_view(
        &self,
        community: Community,
        caller: Option<&str>,
    ) -> AppResult<CommunityView> {
        let members = self.member_views(&community).await?;
        let quiz_count = self
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
        let relation = self.resolve_relation(&community, caller).await?;

        Ok(CommunityView {
            id: community.id,
            name: community.name,
            description: community.description,
            banner: community.banner,
            allow_public_quiz_submission: community.allow_public_quiz_submission,
            creator,
            member_count: members.len(),
            quiz_count,
            is_joined: relation.is_joined(),
            member_role: relation,
            created_at: community.created_at,
            members,
        })
    }
}
