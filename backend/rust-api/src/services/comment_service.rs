use chrono::Utc;
use std::collections::HashMap;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::comment::{CommentView, CreateCommentRequest, QuestionComment};
use crate::store::Repositories;

pub struct CommentService {
    repos: Repositories,
}

impl CommentService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    async fn ensure_question(&self, question_id: &str) -> AppResult<()> {
        self.repos
            .quizzes
            .find_question(question_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::not_found("Question not found"))
    }

    pub async fn list(&self, question_id: &str) -> AppResult<Vec<CommentView>> {
        self.ensure_question(question_id).await?;
        let mut grouped = self.views_for_questions(&[question_id.to_string()]).await?;
        Ok(grouped.remove(question_id).unwrap_or_default())
    }

    pub async fn create(
        &self,
        question_id: &str,
        user_id: &str,
        req: CreateCommentRequest,
    ) -> AppResult<String> {
        req.validate()?;
        self.ensure_question(question_id).await?;

        let text = req.comment_text.trim();
        if text.is_empty() {
            return Err(AppError::validation("Comment cannot be empty"));
        }

        let now = Utc::now();
        let comment = QuestionComment {
            id: uuid::Uuid::new_v4().to_string(),
            question_id: question_id.to_string(),
            user_id: user_id.to_string(),
            comment_text: text.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.repos.comments.insert_comment(&comment).await?;
        tracing::debug!(question_id, comment_id = %comment.id, "Comment added");
        Ok(comment.id)
    }

    /// Only the author may delete a comment
    pub async fn delete(&self, comment_id: &str, user_id: &str) -> AppResult<()> {
        let comment = self
            .repos
            .comments
            .find_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment not found"))?;
        if comment.user_id != user_id {
            return Err(AppError::forbidden("You can only delete your own comments"));
        }
        if !self.repos.comments.delete_comment(comment_id).await? {
            return Err(AppError::not_found("Comment not found"));
        }
        Ok(())
    }

    /// Comments keyed by question, oldest first, with their authors resolved
    pub async fn views_for_questions(
        &self,
        question_ids: &[String],
    ) -> AppResult<HashMap<String, Vec<CommentView>>> {
        let comments = self.repos.comments.comments_for_questions(question_ids).await?;

        let mut author_ids: Vec<String> = comments.iter().map(|c| c.user_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();
        let authors: HashMap<String, _> = self
            .repos
            .users
            .find_users(&author_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let mut grouped: HashMap<String, Vec<CommentView>> = HashMap::new();
        for comment in comments {
            let author = authors.get(&comment.user_id);
            grouped
                .entry(comment.question_id.clone())
                .or_default()
                .push(CommentView::new(comment, author));
        }
        Ok(grouped)
    }
}
