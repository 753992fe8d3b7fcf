use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::user::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    pub creator_id: String,
    #[serde(default)]
    pub allow_public_quiz_submission: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Membership row; `_id` is `"{community_id}:{user_id}"` so a pair can exist only once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityMember {
    #[serde(rename = "_id")]
    pub id: String,
    pub community_id: String,
    pub user_id: String,
    /// Stored as free text; read through [`MemberRole::from_stored`]
    pub role: String,
    #[serde(rename = "joinedAt", with = "bson_datetime_as_chrono")]
    pub joined_at: DateTime<Utc>,
}

impl CommunityMember {
    pub fn new(community_id: &str, user_id: &str, role: MemberRole) -> Self {
        CommunityMember {
            id: Self::key(community_id, user_id),
            community_id: community_id.to_string(),
            user_id: user_id.to_string(),
            role: role.as_str().to_string(),
            joined_at: Utc::now(),
        }
    }

    pub fn key(community_id: &str, user_id: &str) -> String {
        format!("{}:{}", community_id, user_id)
    }

    pub fn member_role(&self) -> MemberRole {
        MemberRole::from_stored(&self.role)
    }
}

/// Permission tier stored on a membership row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Creator,
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Creator => "creator",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }

    /// Unknown legacy values fall back to `Member`
    pub fn from_stored(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "creator" => MemberRole::Creator,
            "admin" => MemberRole::Admin,
            _ => MemberRole::Member,
        }
    }
}

/// Caller's relationship to a community, attached to community and quiz responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommunityRelation {
    Creator,
    Admin,
    Member,
    NonMember,
}

impl CommunityRelation {
    pub fn is_joined(&self) -> bool {
        !matches!(self, CommunityRelation::NonMember)
    }

    /// Creator and admins manage quizzes of the community
    pub fn can_manage(&self) -> bool {
        matches!(self, CommunityRelation::Creator | CommunityRelation::Admin)
    }
}

impl From<MemberRole> for CommunityRelation {
    fn from(role: MemberRole) -> Self {
        match role {
            MemberRole::Creator => CommunityRelation::Creator,
            MemberRole::Admin => CommunityRelation::Admin,
            MemberRole::Member => CommunityRelation::Member,
        }
    }
}

/// Partial update applied by the community store
#[derive(Debug, Default, Clone)]
pub struct CommunityUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub banner: Option<String>,
    pub allow_public_quiz_submission: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommunityRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    #[validate(length(max = 500))]
    pub banner: Option<String>,

    #[serde(default)]
    pub allow_public_quiz_submission: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommunityRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    #[validate(length(max = 500))]
    pub banner: Option<String>,

    pub allow_public_quiz_submission: Option<bool>,
}

impl From<UpdateCommunityRequest> for CommunityUpdate {
    fn from(req: UpdateCommunityRequest) -> Self {
        CommunityUpdate {
            name: req.name,
            description: req.description,
            banner: req.banner,
            allow_public_quiz_submission: req.allow_public_quiz_submission,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCommunityResponse {
    pub community_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Joined,
    Left,
}

#[derive(Debug, Serialize)]
pub struct MembershipToggleResponse {
    pub status: MembershipStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub user: UserSummary,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommunityView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub banner: Option<String>,
    pub allow_public_quiz_submission: bool,
    pub creator: Option<UserSummary>,
    pub member_count: usize,
    pub quiz_count: usize,
    pub is_joined: bool,
    pub member_role: CommunityRelation,
    pub created_at: DateTime<Utc>,
    pub members: Vec<MemberView>,
}

#[derive(Debug, Serialize)]
pub struct CommunityQuizView {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub likes_count: i64,
    pub questions_count: usize,
    pub is_liked: bool,
    pub creator: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommunityDetail {
    #[serde(flatten)]
    pub community: CommunityView,
    pub quizzes: Vec<CommunityQuizView>,
}
