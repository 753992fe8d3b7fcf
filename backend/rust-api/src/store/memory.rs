//! In-process backend used for local development and tests.
//!
//! A transaction works on a private copy of the state and records every
//! write. Commit replays the recorded writes against the current shared
//! state under the write lock, so unique checks see concurrent commits.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    CommentStore, CommunityStore, HealthCheck, QuizStore, StoreError, StoreResult, Transaction,
    TransactionRunner, UserStore,
};
use crate::models::{
    comment::QuestionComment,
    community::{Community, CommunityMember, CommunityUpdate, MemberRole},
    quiz::{Question, Quiz, QuizAttempt, QuizLike, QuizOption, UserAnswer},
    user::{ProfileUpdate, User},
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    users: HashMap<String, User>,
    communities: HashMap<String, Community>,
    members: HashMap<String, CommunityMember>,
    quizzes: HashMap<String, Quiz>,
    questions: HashMap<String, Question>,
    options: HashMap<String, QuizOption>,
    attempts: HashMap<String, QuizAttempt>,
    answers: HashMap<String, UserAnswer>,
    likes: HashMap<String, QuizLike>,
    comments: HashMap<String, QuestionComment>,
}

#[derive(Debug, Clone)]
enum StagedOp {
    InsertQuiz(Quiz),
    InsertQuestions(Vec<Question>),
    InsertOptions(Vec<QuizOption>),
    InsertAttempt(QuizAttempt),
    InsertAnswers(Vec<UserAnswer>),
    UpdateAttempt(QuizAttempt),
    InsertLike(QuizLike),
    DeleteLike(String),
    AdjustLikes { quiz_id: String, delta: i64 },
}

impl MemoryState {
    fn apply(&mut self, op: &StagedOp) -> StoreResult<()> {
        match op {
            StagedOp::InsertQuiz(quiz) => {
                if self.quizzes.contains_key(&quiz.id) {
                    return Err(StoreError::Conflict(format!("quiz {}", quiz.id)));
                }
                self.quizzes.insert(quiz.id.clone(), quiz.clone());
            }
            StagedOp::InsertQuestions(questions) => {
                for question in questions {
                    self.questions.insert(question.id.clone(), question.clone());
                }
            }
            StagedOp::InsertOptions(options) => {
                for option in options {
                    self.options.insert(option.id.clone(), option.clone());
                }
            }
            StagedOp::InsertAttempt(attempt) => {
                let duplicate = self.attempts.values().any(|a| {
                    a.quiz_id == attempt.quiz_id
                        && a.user_id == attempt.user_id
                        && a.attempt_number == attempt.attempt_number
                });
                if duplicate || self.attempts.contains_key(&attempt.id) {
                    return Err(StoreError::Conflict(format!(
                        "attempt {} of user {} on quiz {}",
                        attempt.attempt_number, attempt.user_id, attempt.quiz_id
                    )));
                }
                self.attempts.insert(attempt.id.clone(), attempt.clone());
            }
            StagedOp::InsertAnswers(answers) => {
                for answer in answers {
                    self.answers.insert(answer.id.clone(), answer.clone());
                }
            }
            StagedOp::UpdateAttempt(attempt) => {
                let stored = self
                    .attempts
                    .get_mut(&attempt.id)
                    .ok_or_else(|| StoreError::NotFound(format!("attempt {}", attempt.id)))?;
                stored.score = attempt.score;
                stored.total_questions = attempt.total_questions;
                stored.percentage = attempt.percentage;
                stored.time_taken_minutes = attempt.time_taken_minutes;
                stored.completed_at = attempt.completed_at;
            }
            StagedOp::InsertLike(like) => {
                if self.likes.contains_key(&like.id) {
                    return Err(StoreError::Conflict(format!("like {}", like.id)));
                }
                self.likes.insert(like.id.clone(), like.clone());
            }
            StagedOp::DeleteLike(key) => {
                if self.likes.remove(key).is_none() {
                    return Err(StoreError::NotFound(format!("like {}", key)));
                }
            }
            StagedOp::AdjustLikes { quiz_id, delta } => {
                let quiz = self
                    .quizzes
                    .get_mut(quiz_id)
                    .ok_or_else(|| StoreError::NotFound(format!("quiz {}", quiz_id)))?;
                quiz.likes_count += delta;
            }
        }
        Ok(())
    }

    fn remove_question_tree(&mut self, question_id: &str) -> bool {
        if self.questions.remove(question_id).is_none() {
            return false;
        }
        self.options.retain(|_, o| o.question_id != question_id);
        self.comments.retain(|_, c| c.question_id != question_id);
        self.answers.retain(|_, a| a.question_id != question_id);
        true
    }

    fn remove_quiz_tree(&mut self, quiz_id: &str) -> bool {
        if self.quizzes.remove(quiz_id).is_none() {
            return false;
        }
        let question_ids: Vec<String> = self
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .map(|q| q.id.clone())
            .collect();
        for question_id in &question_ids {
            self.remove_question_tree(question_id);
        }
        self.attempts.retain(|_, a| a.quiz_id != quiz_id);
        self.answers.retain(|_, a| a.quiz_id != quiz_id);
        self.likes.retain(|_, l| l.quiz_id != quiz_id);
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {}", user.email)));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> StoreResult<Option<User>> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(id) else {
            return Ok(None);
        };
        if let Some(username) = &update.username {
            user.username = username.clone();
        }
        if let Some(avatar) = &update.avatar {
            user.avatar = Some(avatar.clone());
        }
        if let Some(banner) = &update.banner {
            user.banner = Some(banner.clone());
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn link_google_account(&self, id: &str, google_id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        user.google_id = Some(google_id.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn insert_community(
        &self,
        community: &Community,
        creator: &CommunityMember,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.communities.contains_key(&community.id) {
            return Err(StoreError::Conflict(format!("community {}", community.id)));
        }
        state
            .communities
            .insert(community.id.clone(), community.clone());
        state.members.insert(creator.id.clone(), creator.clone());
        Ok(())
    }

    async fn find_community(&self, id: &str) -> StoreResult<Option<Community>> {
        Ok(self.state.read().await.communities.get(id).cloned())
    }

    async fn list_communities(&self) -> StoreResult<Vec<Community>> {
        let state = self.state.read().await;
        let mut communities: Vec<Community> = state.communities.values().cloned().collect();
        communities.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(communities)
    }

    async fn update_community(
        &self,
        id: &str,
        update: &CommunityUpdate,
    ) -> StoreResult<Option<Community>> {
        let mut state = self.state.write().await;
        let Some(community) = state.communities.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            community.name = name.clone();
        }
        if let Some(description) = &update.description {
            community.description = Some(description.clone());
        }
        if let Some(banner) = &update.banner {
            community.banner = Some(banner.clone());
        }
        if let Some(allow) = update.allow_public_quiz_submission {
            community.allow_public_quiz_submission = allow;
        }
        community.updated_at = Utc::now();
        Ok(Some(community.clone()))
    }

    async fn delete_community(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.communities.remove(id).is_none() {
            return Ok(false);
        }
        let quiz_ids: Vec<String> = state
            .quizzes
            .values()
            .filter(|q| q.community_id == id)
            .map(|q| q.id.clone())
            .collect();
        for quiz_id in &quiz_ids {
            state.remove_quiz_tree(quiz_id);
        }
        state.members.retain(|_, m| m.community_id != id);
        Ok(true)
    }

    async fn find_member(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<CommunityMember>> {
        let key = CommunityMember::key(community_id, user_id);
        Ok(self.state.read().await.members.get(&key).cloned())
    }

    async fn insert_member(&self, member: &CommunityMember) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.members.contains_key(&member.id) {
            return Ok(false);
        }
        state.members.insert(member.id.clone(), member.clone());
        Ok(true)
    }

    async fn delete_member(&self, community_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = CommunityMember::key(community_id, user_id);
        Ok(self.state.write().await.members.remove(&key).is_some())
    }

    async fn list_members(&self, community_id: &str) -> StoreResult<Vec<CommunityMember>> {
        let state = self.state.read().await;
        let mut members: Vec<CommunityMember> = state
            .members
            .values()
            .filter(|m| m.community_id == community_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(members)
    }

    async fn set_member_role(
        &self,
        community_id: &str,
        user_id: &str,
        role: MemberRole,
    ) -> StoreResult<bool> {
        let key = CommunityMember::key(community_id, user_id);
        let mut state = self.state.write().await;
        match state.members.get_mut(&key) {
            Some(member) => {
                member.role = role.as_str().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn memberships_of(&self, user_id: &str) -> StoreResult<Vec<CommunityMember>> {
        let state = self.state.read().await;
        let mut members: Vec<CommunityMember> = state
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }
}

fn newest_first(quizzes: &mut [Quiz]) {
    quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn find_quiz(&self, id: &str) -> StoreResult<Option<Quiz>> {
        Ok(self.state.read().await.quizzes.get(id).cloned())
    }

    async fn list_published_quizzes(&self) -> StoreResult<Vec<Quiz>> {
        let state = self.state.read().await;
        let mut quizzes: Vec<Quiz> = state
            .quizzes
            .values()
            .filter(|q| q.is_published)
            .cloned()
            .collect();
        newest_first(&mut quizzes);
        Ok(quizzes)
    }

    async fn list_community_quizzes(&self, community_id: &str) -> StoreResult<Vec<Quiz>> {
        let state = self.state.read().await;
        let mut quizzes: Vec<Quiz> = state
            .quizzes
            .values()
            .filter(|q| q.community_id == community_id)
            .cloned()
            .collect();
        newest_first(&mut quizzes);
        Ok(quizzes)
    }

    async fn list_quizzes_by_creator(&self, user_id: &str) -> StoreResult<Vec<Quiz>> {
        let state = self.state.read().await;
        let mut quizzes: Vec<Quiz> = state
            .quizzes
            .values()
            .filter(|q| q.creator_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut quizzes);
        Ok(quizzes)
    }

    async fn delete_quiz(&self, id: &str) -> StoreResult<bool> {
        Ok(self.state.write().await.remove_quiz_tree(id))
    }

    async fn questions_for_quiz(&self, quiz_id: &str) -> StoreResult<Vec<Question>> {
        let state = self.state.read().await;
        let mut questions: Vec<Question> = state
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        Ok(questions)
    }

    async fn find_question(&self, id: &str) -> StoreResult<Option<Question>> {
        Ok(self.state.read().await.questions.get(id).cloned())
    }

    async fn options_for_questions(
        &self,
        question_ids: &[String],
    ) -> StoreResult<Vec<QuizOption>> {
        let wanted: HashSet<&str> = question_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        let mut options: Vec<QuizOption> = state
            .options
            .values()
            .filter(|o| wanted.contains(o.question_id.as_str()))
            .cloned()
            .collect();
        options.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
        Ok(options)
    }

    async fn delete_question(&self, id: &str) -> StoreResult<bool> {
        Ok(self.state.write().await.remove_question_tree(id))
    }

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<QuizAttempt>> {
        Ok(self.state.read().await.attempts.get(id).cloned())
    }

    async fn attempts_for_quiz(&self, quiz_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn attempts_for_user(&self, user_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        let state = self.state.read().await;
        let mut attempts: Vec<QuizAttempt> = state
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then(b.attempt_number.cmp(&a.attempt_number))
        });
        Ok(attempts)
    }

    async fn answers_for_attempt(&self, attempt_id: &str) -> StoreResult<Vec<UserAnswer>> {
        let state = self.state.read().await;
        Ok(state
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn option_selection_counts(&self, quiz_id: &str) -> StoreResult<HashMap<String, u64>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for answer in state.answers.values().filter(|a| a.quiz_id == quiz_id) {
            if let Some(option_id) = &answer.option_id {
                *counts.entry(option_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn has_like(&self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = QuizLike::key(quiz_id, user_id);
        Ok(self.state.read().await.likes.contains_key(&key))
    }

    async fn liked_quiz_ids(&self, user_id: &str) -> StoreResult<HashSet<String>> {
        let state = self.state.read().await;
        Ok(state
            .likes
            .values()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.quiz_id.clone())
            .collect())
    }

    async fn count_likes(&self, quiz_id: &str) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.likes.values().filter(|l| l.quiz_id == quiz_id).count() as u64)
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert_comment(&self, comment: &QuestionComment) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.comments.insert(comment.id.clone(), comment.clone());
        Ok(())
    }

    async fn find_comment(&self, id: &str) -> StoreResult<Option<QuestionComment>> {
        Ok(self.state.read().await.comments.get(id).cloned())
    }

    async fn comments_for_questions(
        &self,
        question_ids: &[String],
    ) -> StoreResult<Vec<QuestionComment>> {
        let wanted: HashSet<&str> = question_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        let mut comments: Vec<QuestionComment> = state
            .comments
            .values()
            .filter(|c| wanted.contains(c.question_id.as_str()))
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn delete_comment(&self, id: &str) -> StoreResult<bool> {
        Ok(self.state.write().await.comments.remove(id).is_some())
    }
}

struct MemoryTransaction {
    shared: Arc<RwLock<MemoryState>>,
    working: MemoryState,
    staged: Vec<StagedOp>,
}

impl MemoryTransaction {
    fn stage(&mut self, op: StagedOp) -> StoreResult<()> {
        self.working.apply(&op)?;
        self.staged.push(op);
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert_quiz(&mut self, quiz: &Quiz) -> StoreResult<()> {
        self.stage(StagedOp::InsertQuiz(quiz.clone()))
    }

    async fn insert_questions(&mut self, questions: &[Question]) -> StoreResult<()> {
        self.stage(StagedOp::InsertQuestions(questions.to_vec()))
    }

    async fn insert_options(&mut self, options: &[QuizOption]) -> StoreResult<()> {
        self.stage(StagedOp::InsertOptions(options.to_vec()))
    }

    async fn count_attempts(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<u64> {
        Ok(self
            .working
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id && a.user_id == user_id)
            .count() as u64)
    }

    async fn insert_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.stage(StagedOp::InsertAttempt(attempt.clone()))
    }

    async fn insert_answers(&mut self, answers: &[UserAnswer]) -> StoreResult<()> {
        self.stage(StagedOp::InsertAnswers(answers.to_vec()))
    }

    async fn update_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.stage(StagedOp::UpdateAttempt(attempt.clone()))
    }

    async fn has_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        Ok(self
            .working
            .likes
            .contains_key(&QuizLike::key(quiz_id, user_id)))
    }

    async fn insert_like(&mut self, like: &QuizLike) -> StoreResult<()> {
        self.stage(StagedOp::InsertLike(like.clone()))
    }

    async fn delete_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = QuizLike::key(quiz_id, user_id);
        if !self.working.likes.contains_key(&key) {
            return Ok(false);
        }
        self.stage(StagedOp::DeleteLike(key))?;
        Ok(true)
    }

    async fn adjust_likes(&mut self, quiz_id: &str, delta: i64) -> StoreResult<()> {
        self.stage(StagedOp::AdjustLikes {
            quiz_id: quiz_id.to_string(),
            delta,
        })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut shared = self.shared.write().await;
        let mut next = shared.clone();
        for op in &self.staged {
            next.apply(op)?;
        }
        *shared = next;
        Ok(())
    }
}

#[async_trait]
impl TransactionRunner for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let working = self.state.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            shared: self.state.clone(),
            working,
            staged: Vec::new(),
        }))
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(id: &str) -> Quiz {
        let now = Utc::now();
        Quiz {
            id: id.to_string(),
            community_id: "c1".to_string(),
            creator_id: "u1".to_string(),
            title: "Capitals".to_string(),
            description: None,
            duration_minutes: 10,
            likes_count: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn attempt(id: &str, number: i32) -> QuizAttempt {
        QuizAttempt {
            id: id.to_string(),
            quiz_id: "q1".to_string(),
            user_id: "u2".to_string(),
            score: 0,
            total_questions: 2,
            percentage: 0.0,
            time_taken_minutes: 3,
            attempt_number: number,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_quiz(&quiz("q1")).await.unwrap();
        }
        assert!(store.find_quiz("q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_quiz(&quiz("q1")).await.unwrap();
        tx.insert_attempt(&attempt("a1", 1)).await.unwrap();
        assert_eq!(tx.count_attempts("q1", "u2").await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert!(store.find_quiz("q1").await.unwrap().is_some());
        assert_eq!(store.attempts_for_quiz("q1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_attempt_number_conflicts_at_commit() {
        let store = MemoryStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_attempt(&attempt("a1", 1)).await.unwrap();
        second.insert_attempt(&attempt("a2", 1)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.attempts_for_quiz("q1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_like_counter_follows_rows() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_quiz(&quiz("q1")).await.unwrap();
        tx.insert_like(&QuizLike::new("q1", "u2")).await.unwrap();
        tx.adjust_likes("q1", 1).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.find_quiz("q1").await.unwrap().unwrap().likes_count, 1);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_like("q1", "u2").await.unwrap());
        assert!(!tx.delete_like("q1", "u2").await.unwrap());
        tx.adjust_likes("q1", -1).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_quiz("q1").await.unwrap().unwrap().likes_count, 0);
        assert_eq!(store.count_likes("q1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_like_counter_is_not_clamped() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_quiz(&quiz("q1")).await.unwrap();
        tx.adjust_likes("q1", -1).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_quiz("q1").await.unwrap().unwrap().likes_count, -1);
    }

    #[tokio::test]
    async fn test_delete_community_cascades() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let community = Community {
            id: "c1".to_string(),
            name: "Geography".to_string(),
            description: None,
            banner: None,
            creator_id: "u1".to_string(),
            allow_public_quiz_submission: false,
            created_at: now,
            updated_at: now,
        };
        let creator = CommunityMember::new("c1", "u1", MemberRole::Creator);
        store.insert_community(&community, &creator).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_quiz(&quiz("q1")).await.unwrap();
        tx.insert_attempt(&attempt("a1", 1)).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.delete_community("c1").await.unwrap());
        assert!(store.find_quiz("q1").await.unwrap().is_none());
        assert!(store.find_attempt("a1").await.unwrap().is_none());
        assert!(store.list_members("c1").await.unwrap().is_empty());
    }
}
