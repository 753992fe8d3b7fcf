use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::user::User;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionComment {
    #[serde(rename = "_id")]
    pub id: String,
    pub question_id: String,
    pub user_id: String,
    pub comment_text: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 1000, message = "Comment must be between 1 and 1000 characters"))]
    pub comment_text: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCommentResponse {
    pub id: String,
}

/// Comment with its author, as shown under a question
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: QuestionComment, author: Option<&User>) -> Self {
        CommentView {
            id: comment.id,
            user_id: comment.user_id,
            username: author.map(|u| u.username.clone()).unwrap_or_default(),
            avatar: author.and_then(|u| u.avatar.clone()),
            comment_text: comment.comment_text,
            created_at: comment.created_at,
        }
    }
}
