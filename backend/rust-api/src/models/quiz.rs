use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::comment::CommentView;
use super::community::CommunityRelation;
use super::user::UserSummary;
use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: String,
    pub community_id: String,
    pub creator_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub duration_minutes: i32,
    /// Denormalized count of `quiz_likes` rows
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub is_published: bool,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub question_text: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub correct_answer: String,
    pub order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizOption {
    #[serde(rename = "_id")]
    pub id: String,
    pub question_id: String,
    pub text: String,
    pub is_correct: bool,
    /// Insertion order inside the question
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub score: i32,
    pub total_questions: i32,
    pub percentage: f64,
    pub time_taken_minutes: i32,
    pub attempt_number: i32,
    #[serde(
        rename = "completedAt",
        default,
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnswer {
    #[serde(rename = "_id")]
    pub id: String,
    pub attempt_id: String,
    pub quiz_id: String,
    pub question_id: String,
    #[serde(default)]
    pub option_id: Option<String>,
    pub answer_text: String,
}

/// Existence of a row means the user liked the quiz; `_id` is `"{quiz_id}:{user_id}"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizLike {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl QuizLike {
    pub fn new(quiz_id: &str, user_id: &str) -> Self {
        QuizLike {
            id: Self::key(quiz_id, user_id),
            quiz_id: quiz_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn key(quiz_id: &str, user_id: &str) -> String {
        format!("{}:{}", quiz_id, user_id)
    }
}

// ---- Requests ----

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOptionRequest {
    #[validate(length(min = 1, max = 500, message = "Option text must be between 1 and 500 characters"))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000, message = "Question text must be between 1 and 1000 characters"))]
    pub question_text: String,

    #[validate(length(max = 2000))]
    pub explanation: Option<String>,

    #[validate(length(min = 1, message = "Correct answer is required"))]
    pub correct_answer: String,

    #[serde(default)]
    pub order_index: i32,

    #[validate(nested)]
    #[serde(default)]
    pub options: Vec<CreateOptionRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, message = "community_id is required"))]
    pub community_id: String,

    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    #[validate(range(min = 0, message = "Duration cannot be negative"))]
    pub duration_minutes: i32,

    #[serde(default)]
    pub is_published: bool,

    #[validate(length(min = 1, message = "Quiz must contain at least one question"), nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedAnswer {
    #[serde(default)]
    pub answer_text: String,
    #[serde(default)]
    pub option_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitQuizRequest {
    pub duration_minutes: i32,
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

// ---- Responses ----

#[derive(Debug, Serialize)]
pub struct CreateQuizResponse {
    pub quiz_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateQuestionResponse {
    pub question_id: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitQuizResponse {
    /// Identifier of the stored attempt
    pub result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeStatus {
    Liked,
    Unliked,
}

#[derive(Debug, Serialize)]
pub struct LikeToggleResponse {
    pub status: LikeStatus,
}

#[derive(Debug, Serialize)]
pub struct TakeOption {
    pub option_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TakeQuestion {
    pub question_id: String,
    pub question_text: String,
    pub options: Vec<TakeOption>,
}

/// Quiz as presented to a taker: no correctness data
#[derive(Debug, Serialize)]
pub struct TakeQuiz {
    pub quiz_id: String,
    pub title: String,
    pub duration: i32,
    pub questions: Vec<TakeQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizCommunityInfo {
    pub id: String,
    pub name: String,
    pub is_joined: bool,
    pub member_role: CommunityRelation,
}

/// Quiz author with their standing in the quiz's community
#[derive(Debug, Clone, Serialize)]
pub struct QuizCreatorInfo {
    #[serde(flatten)]
    pub user: UserSummary,
    pub role: CommunityRelation,
}

#[derive(Debug, Serialize)]
pub struct QuizListItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub likes_count: i64,
    pub is_published: bool,
    pub is_liked: bool,
    pub is_new: bool,
    pub questions_count: usize,
    pub average_score: f64,
    pub students_count: usize,
    pub community: Option<QuizCommunityInfo>,
    pub creator: Option<QuizCreatorInfo>,
    pub created_at: DateTime<Utc>,
    pub created_at_text: String,
}

#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: QuizListItem,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub current_attempt_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub attempt_id: String,
    pub score: i32,
    pub percentage: f64,
    pub time_taken_minutes: i32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub attempt_id: String,
    pub attempt_number: i32,
    pub score: i32,
    pub total_questions: i32,
    pub percentage: f64,
    pub time_taken_minutes: i32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&QuizAttempt> for AttemptSummary {
    fn from(attempt: &QuizAttempt) -> Self {
        AttemptSummary {
            attempt_id: attempt.id.clone(),
            attempt_number: attempt.attempt_number,
            score: attempt.score,
            total_questions: attempt.total_questions,
            percentage: attempt.percentage,
            time_taken_minutes: attempt.time_taken_minutes,
            completed_at: attempt.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionStat {
    pub option_id: String,
    pub text: String,
    pub is_correct: bool,
    pub selection_count: u64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub question_text: String,
    pub explanation: Option<String>,
    pub correct_answer: String,
    pub user_answer: Option<String>,
    pub user_option_id: Option<String>,
    pub is_correct: bool,
    pub options: Vec<OptionStat>,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Serialize)]
pub struct QuizResultResponse {
    pub attempt_id: String,
    pub quiz_id: String,
    pub quiz_title: String,
    pub score: i32,
    pub total_questions: i32,
    pub percentage: f64,
    pub time_taken_minutes: i32,
    pub attempt_number: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub questions: Vec<QuestionResult>,
}
