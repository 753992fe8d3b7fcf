//! Persistence gateway.
//!
//! Services talk to storage only through the traits below. Finders return
//! `Ok(None)` for missing rows; services turn that into a domain `NotFound`.
//! Multi-row writes that must be atomic go through [`TransactionRunner`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::{
    comment::QuestionComment,
    community::{Community, CommunityMember, CommunityUpdate, MemberRole},
    quiz::{Question, Quiz, QuizAttempt, QuizLike, QuizOption, UserAnswer},
    user::{ProfileUpdate, User},
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("duplicate record: {0}")]
    Conflict(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the e-mail is taken
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>>;
    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> StoreResult<Option<User>>;
    async fn link_google_account(&self, id: &str, google_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Inserts the community together with its creator's membership row
    async fn insert_community(
        &self,
        community: &Community,
        creator: &CommunityMember,
    ) -> StoreResult<()>;
    async fn find_community(&self, id: &str) -> StoreResult<Option<Community>>;
    /// Newest first
    async fn list_communities(&self) -> StoreResult<Vec<Community>>;
    async fn update_community(
        &self,
        id: &str,
        update: &CommunityUpdate,
    ) -> StoreResult<Option<Community>>;
    /// Removes the community, its memberships and everything owned by its quizzes
    async fn delete_community(&self, id: &str) -> StoreResult<bool>;

    async fn find_member(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<CommunityMember>>;
    /// Returns `false` when the pair already existed (no-op)
    async fn insert_member(&self, member: &CommunityMember) -> StoreResult<bool>;
    async fn delete_member(&self, community_id: &str, user_id: &str) -> StoreResult<bool>;
    /// Oldest membership first
    async fn list_members(&self, community_id: &str) -> StoreResult<Vec<CommunityMember>>;
    async fn set_member_role(
        &self,
        community_id: &str,
        user_id: &str,
        role: MemberRole,
    ) -> StoreResult<bool>;
    async fn memberships_of(&self, user_id: &str) -> StoreResult<Vec<CommunityMember>>;
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn find_quiz(&self, id: &str) -> StoreResult<Option<Quiz>>;
    /// Published quizzes, newest first
    async fn list_published_quizzes(&self) -> StoreResult<Vec<Quiz>>;
    async fn list_community_quizzes(&self, community_id: &str) -> StoreResult<Vec<Quiz>>;
    async fn list_quizzes_by_creator(&self, user_id: &str) -> StoreResult<Vec<Quiz>>;
    /// Removes the quiz with its questions, options, comments, attempts, answers and likes
    async fn delete_quiz(&self, id: &str) -> StoreResult<bool>;

    /// Ordered by `order_index`
    async fn questions_for_quiz(&self, quiz_id: &str) -> StoreResult<Vec<Question>>;
    async fn find_question(&self, id: &str) -> StoreResult<Option<Question>>;
    /// Ordered by `position`
    async fn options_for_questions(&self, question_ids: &[String])
        -> StoreResult<Vec<QuizOption>>;
    /// Removes the question with its options, comments and recorded answers
    async fn delete_question(&self, id: &str) -> StoreResult<bool>;

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<QuizAttempt>>;
    async fn attempts_for_quiz(&self, quiz_id: &str) -> StoreResult<Vec<QuizAttempt>>;
    /// Newest first
    async fn attempts_for_user(&self, user_id: &str) -> StoreResult<Vec<QuizAttempt>>;
    async fn answers_for_attempt(&self, attempt_id: &str) -> StoreResult<Vec<UserAnswer>>;
    /// Option id -> number of recorded answers choosing it, across all attempts on the quiz
    async fn option_selection_counts(&self, quiz_id: &str) -> StoreResult<HashMap<String, u64>>;

    async fn has_like(&self, quiz_id: &str, user_id: &str) -> StoreResult<bool>;
    async fn liked_quiz_ids(&self, user_id: &str) -> StoreResult<HashSet<String>>;
    async fn count_likes(&self, quiz_id: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn insert_comment(&self, comment: &QuestionComment) -> StoreResult<()>;
    async fn find_comment(&self, id: &str) -> StoreResult<Option<QuestionComment>>;
    /// Oldest first
    async fn comments_for_questions(
        &self,
        question_ids: &[String],
    ) -> StoreResult<Vec<QuestionComment>>;
    async fn delete_comment(&self, id: &str) -> StoreResult<bool>;
}

/// Unit of atomic work. Nothing is visible to other readers before
/// [`Transaction::commit`]; dropping an uncommitted transaction rolls it back.
#[async_trait]
pub trait Transaction: Send {
    async fn insert_quiz(&mut self, quiz: &Quiz) -> StoreResult<()>;
    async fn insert_questions(&mut self, questions: &[Question]) -> StoreResult<()>;
    async fn insert_options(&mut self, options: &[QuizOption]) -> StoreResult<()>;

    async fn count_attempts(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<u64>;
    /// Fails with `Conflict` on a duplicate (quiz, user, attempt_number)
    async fn insert_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()>;
    async fn insert_answers(&mut self, answers: &[UserAnswer]) -> StoreResult<()>;
    /// Overwrites score, percentage and completion time; `NotFound` if the row is gone
    async fn update_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()>;

    async fn has_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool>;
    async fn insert_like(&mut self, like: &QuizLike) -> StoreResult<()>;
    async fn delete_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool>;
    async fn adjust_likes(&mut self, quiz_id: &str, delta: i64) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionRunner: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn backend_name(&self) -> &'static str;
    async fn ping(&self) -> StoreResult<()>;
}

/// Collaborators injected into every service
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserStore>,
    pub communities: Arc<dyn CommunityStore>,
    pub quizzes: Arc<dyn QuizStore>,
    pub comments: Arc<dyn CommentStore>,
    pub transactions: Arc<dyn TransactionRunner>,
    pub health: Arc<dyn HealthCheck>,
}

impl Repositories {
    /// Wires every collaborator to one backend
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: UserStore
            + CommunityStore
            + QuizStore
            + CommentStore
            + TransactionRunner
            + HealthCheck
            + 'static,
    {
        Repositories {
            users: store.clone(),
            communities: store.clone(),
            quizzes: store.clone(),
            comments: store.clone(),
            transactions: store.clone(),
            health: store,
        }
    }
}
