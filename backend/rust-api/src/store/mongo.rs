//! MongoDB backend.
//!
//! Multi-document writes run inside a `ClientSession` transaction, which
//! needs a replica set. Dropping a session with an open transaction aborts it.

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Client, ClientSession, Collection, Database, IndexModel,
};
use std::collections::{HashMap, HashSet};

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
use crate::utils::time::chrono_to_bson;

const USERS: &str = "users";
const COMMUNITIES: &str = "communities";
const MEMBERS: &str = "community_members";
const QUIZZES: &str = "quizzes";
const QUESTIONS: &str = "questions";
const OPTIONS: &str = "options";
const ATTEMPTS: &str = "quiz_attempts";
const ANSWERS: &str = "user_answers";
const LIKES: &str = "quiz_likes";
const COMMENTS: &str = "question_comments";

const DUPLICATE_KEY: i32 = 11000;

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(we)) = err.kind.as_ref() {
        return we.code == DUPLICATE_KEY;
    }
    err.to_string().contains("E11000")
}

fn write_error(err: mongodb::error::Error, what: String) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Conflict(what)
    } else {
        StoreError::from(err)
    }
}

fn string_ids(values: Vec<Bson>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        let store = MongoStore { client, db };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "quiz_id": 1, "user_id": 1, "attempt_number": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.questions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "quiz_id": 1, "order_index": 1 })
                    .build(),
            )
            .await?;
        self.options()
            .create_index(IndexModel::builder().keys(doc! { "question_id": 1 }).build())
            .await?;
        self.answers()
            .create_index(IndexModel::builder().keys(doc! { "attempt_id": 1 }).build())
            .await?;
        self.answers()
            .create_index(IndexModel::builder().keys(doc! { "quiz_id": 1 }).build())
            .await?;
        self.comments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "question_id": 1, "createdAt": 1 })
                    .build(),
            )
            .await?;
        self.members()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await?;
        self.quizzes()
            .create_index(IndexModel::builder().keys(doc! { "community_id": 1 }).build())
            .await?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn communities(&self) -> Collection<Community> {
        self.db.collection(COMMUNITIES)
    }

    fn members(&self) -> Collection<CommunityMember> {
        self.db.collection(MEMBERS)
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.db.collection(QUIZZES)
    }

    fn questions(&self) -> Collection<Question> {
        self.db.collection(QUESTIONS)
    }

    fn options(&self) -> Collection<QuizOption> {
        self.db.collection(OPTIONS)
    }

    fn attempts(&self) -> Collection<QuizAttempt> {
        self.db.collection(ATTEMPTS)
    }

    fn answers(&self) -> Collection<UserAnswer> {
        self.db.collection(ANSWERS)
    }

    fn likes(&self) -> Collection<QuizLike> {
        self.db.collection(LIKES)
    }

    fn comments(&self) -> Collection<QuestionComment> {
        self.db.collection(COMMENTS)
    }

    async fn start_transaction(&self) -> StoreResult<ClientSession> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }

    async fn remove_question_tree(
        &self,
        session: &mut ClientSession,
        question_ids: Vec<String>,
    ) -> StoreResult<()> {
        if question_ids.is_empty() {
            return Ok(());
        }
        let filter = doc! { "question_id": { "$in": question_ids.clone() } };
        self.options()
            .delete_many(filter.clone())
            .session(&mut *session)
            .await?;
        self.comments()
            .delete_many(filter.clone())
            .session(&mut *session)
            .await?;
        self.answers()
            .delete_many(filter)
            .session(&mut *session)
            .await?;
        self.questions()
            .delete_many(doc! { "_id": { "$in": question_ids } })
            .session(&mut *session)
            .await?;
        Ok(())
    }

    async fn remove_quiz_tree(
        &self,
        session: &mut ClientSession,
        quiz_ids: Vec<String>,
    ) -> StoreResult<u64> {
        if quiz_ids.is_empty() {
            return Ok(0);
        }
        let by_quiz = doc! { "quiz_id": { "$in": quiz_ids.clone() } };
        let question_ids = string_ids(
            self.questions()
                .distinct("_id", by_quiz.clone())
                .session(&mut *session)
                .await?,
        );
        self.remove_question_tree(session, question_ids).await?;
        self.answers()
            .delete_many(by_quiz.clone())
            .session(&mut *session)
            .await?;
        self.attempts()
            .delete_many(by_quiz.clone())
            .session(&mut *session)
            .await?;
        self.likes()
            .delete_many(by_quiz)
            .session(&mut *session)
            .await?;
        let deleted = self
            .quizzes()
            .delete_many(doc! { "_id": { "$in": quiz_ids } })
            .session(&mut *session)
            .await?;
        Ok(deleted.deleted_count)
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users()
            .insert_one(user)
            .await
            .map_err(|e| write_error(e, format!("email {}", user.email)))?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .users()
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> StoreResult<Option<User>> {
        let mut set = doc! { "updatedAt": chrono_to_bson(Utc::now()) };
        if let Some(username) = &update.username {
            set.insert("username", username.as_str());
        }
        if let Some(avatar) = &update.avatar {
            set.insert("avatar", avatar.as_str());
        }
        if let Some(banner) = &update.banner {
            set.insert("banner", banner.as_str());
        }
        Ok(self
            .users()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn link_google_account(&self, id: &str, google_id: &str) -> StoreResult<()> {
        let result = self
            .users()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "google_id": google_id,
                    "updatedAt": chrono_to_bson(Utc::now()),
                } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl CommunityStore for MongoStore {
    async fn insert_community(
        &self,
        community: &Community,
        creator: &CommunityMember,
    ) -> StoreResult<()> {
        let mut session = self.start_transaction().await?;
        self.communities()
            .insert_one(community)
            .session(&mut session)
            .await
            .map_err(|e| write_error(e, format!("community {}", community.id)))?;
        self.members()
            .insert_one(creator)
            .session(&mut session)
            .await
            .map_err(|e| write_error(e, format!("member {}", creator.id)))?;
        session.commit_transaction().await?;
        Ok(())
    }

    async fn find_community(&self, id: &str) -> StoreResult<Option<Community>> {
        Ok(self.communities().find_one(doc! { "_id": id }).await?)
    }

    async fn list_communities(&self) -> StoreResult<Vec<Community>> {
        let cursor = self
            .communities()
            .find(doc! {})
            .sort(doc! { "createdAt": -1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_community(
        &self,
        id: &str,
        update: &CommunityUpdate,
    ) -> StoreResult<Option<Community>> {
        let mut set = doc! { "updatedAt": chrono_to_bson(Utc::now()) };
        if let Some(name) = &update.name {
            set.insert("name", name.as_str());
        }
        if let Some(description) = &update.description {
            set.insert("description", description.as_str());
        }
        if let Some(banner) = &update.banner {
            set.insert("banner", banner.as_str());
        }
        if let Some(allow) = update.allow_public_quiz_submission {
            set.insert("allow_public_quiz_submission", allow);
        }
        Ok(self
            .communities()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn delete_community(&self, id: &str) -> StoreResult<bool> {
        let mut session = self.start_transaction().await?;
        let deleted = self
            .communities()
            .delete_one(doc! { "_id": id })
            .session(&mut session)
            .await?;
        if deleted.deleted_count == 0 {
            return Ok(false);
        }
        let quiz_ids = string_ids(
            self.quizzes()
                .distinct("_id", doc! { "community_id": id })
                .session(&mut session)
                .await?,
        );
        self.remove_quiz_tree(&mut session, quiz_ids).await?;
        self.members()
            .delete_many(doc! { "community_id": id })
            .session(&mut session)
            .await?;
        session.commit_transaction().await?;
        Ok(true)
    }

    async fn find_member(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<CommunityMember>> {
        let key = CommunityMember::key(community_id, user_id);
        Ok(self.members().find_one(doc! { "_id": key }).await?)
    }

    async fn insert_member(&self, member: &CommunityMember) -> StoreResult<bool> {
        match self.members().insert_one(member).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_member(&self, community_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = CommunityMember::key(community_id, user_id);
        let result = self.members().delete_one(doc! { "_id": key }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn list_members(&self, community_id: &str) -> StoreResult<Vec<CommunityMember>> {
        let cursor = self
            .members()
            .find(doc! { "community_id": community_id })
            .sort(doc! { "joinedAt": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn set_member_role(
        &self,
        community_id: &str,
        user_id: &str,
        role: MemberRole,
    ) -> StoreResult<bool> {
        let key = CommunityMember::key(community_id, user_id);
        let result = self
            .members()
            .update_one(doc! { "_id": key }, doc! { "$set": { "role": role.as_str() } })
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn memberships_of(&self, user_id: &str) -> StoreResult<Vec<CommunityMember>> {
        let cursor = self
            .members()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "joinedAt": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl QuizStore for MongoStore {
    async fn find_quiz(&self, id: &str) -> StoreResult<Option<Quiz>> {
        Ok(self.quizzes().find_one(doc! { "_id": id }).await?)
    }

    async fn list_published_quizzes(&self) -> StoreResult<Vec<Quiz>> {
        let cursor = self
            .quizzes()
            .find(doc! { "is_published": true })
            .sort(doc! { "createdAt": -1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_community_quizzes(&self, community_id: &str) -> StoreResult<Vec<Quiz>> {
        let cursor = self
            .quizzes()
            .find(doc! { "community_id": community_id })
            .sort(doc! { "createdAt": -1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_quizzes_by_creator(&self, user_id: &str) -> StoreResult<Vec<Quiz>> {
        let cursor = self
            .quizzes()
            .find(doc! { "creator_id": user_id })
            .sort(doc! { "createdAt": -1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_quiz(&self, id: &str) -> StoreResult<bool> {
        let mut session = self.start_transaction().await?;
        let deleted = self
            .remove_quiz_tree(&mut session, vec![id.to_string()])
            .await?;
        session.commit_transaction().await?;
        Ok(deleted > 0)
    }

    async fn questions_for_quiz(&self, quiz_id: &str) -> StoreResult<Vec<Question>> {
        let cursor = self
            .questions()
            .find(doc! { "quiz_id": quiz_id })
            .sort(doc! { "order_index": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_question(&self, id: &str) -> StoreResult<Option<Question>> {
        Ok(self.questions().find_one(doc! { "_id": id }).await?)
    }

    async fn options_for_questions(
        &self,
        question_ids: &[String],
    ) -> StoreResult<Vec<QuizOption>> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .options()
            .find(doc! { "question_id": { "$in": question_ids.to_vec() } })
            .sort(doc! { "position": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_question(&self, id: &str) -> StoreResult<bool> {
        if self.find_question(id).await?.is_none() {
            return Ok(false);
        }
        let mut session = self.start_transaction().await?;
        self.remove_question_tree(&mut session, vec![id.to_string()])
            .await?;
        session.commit_transaction().await?;
        Ok(true)
    }

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<QuizAttempt>> {
        Ok(self.attempts().find_one(doc! { "_id": id }).await?)
    }

    async fn attempts_for_quiz(&self, quiz_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        let cursor = self.attempts().find(doc! { "quiz_id": quiz_id }).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn attempts_for_user(&self, user_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        let cursor = self
            .attempts()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "completedAt": -1, "attempt_number": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn answers_for_attempt(&self, attempt_id: &str) -> StoreResult<Vec<UserAnswer>> {
        let cursor = self
            .answers()
            .find(doc! { "attempt_id": attempt_id })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn option_selection_counts(&self, quiz_id: &str) -> StoreResult<HashMap<String, u64>> {
        let pipeline = vec![
            doc! { "$match": { "quiz_id": quiz_id, "option_id": { "$ne": Bson::Null } } },
            doc! { "$group": { "_id": "$option_id", "count": { "$sum": 1 } } },
        ];
        let mut cursor = self.answers().aggregate(pipeline).await?;
        let mut counts = HashMap::new();
        while let Some(row) = cursor.try_next().await? {
            let Ok(option_id) = row.get_str("_id") else {
                continue;
            };
            let count = row
                .get_i32("count")
                .map(i64::from)
                .or_else(|_| row.get_i64("count"))
                .unwrap_or(0);
            counts.insert(option_id.to_string(), count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn has_like(&self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = QuizLike::key(quiz_id, user_id);
        Ok(self.likes().find_one(doc! { "_id": key }).await?.is_some())
    }

    async fn liked_quiz_ids(&self, user_id: &str) -> StoreResult<HashSet<String>> {
        let ids = self
            .likes()
            .distinct("quiz_id", doc! { "user_id": user_id })
            .await?;
        Ok(string_ids(ids).into_iter().collect())
    }

    async fn count_likes(&self, quiz_id: &str) -> StoreResult<u64> {
        Ok(self
            .likes()
            .count_documents(doc! { "quiz_id": quiz_id })
            .await?)
    }
}

#[async_trait]
impl CommentStore for MongoStore {
    async fn insert_comment(&self, comment: &QuestionComment) -> StoreResult<()> {
        self.comments().insert_one(comment).await?;
        Ok(())
    }

    async fn find_comment(&self, id: &str) -> StoreResult<Option<QuestionComment>> {
        Ok(self.comments().find_one(doc! { "_id": id }).await?)
    }

    async fn comments_for_questions(
        &self,
        question_ids: &[String],
    ) -> StoreResult<Vec<QuestionComment>> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .comments()
            .find(doc! { "question_id": { "$in": question_ids.to_vec() } })
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_comment(&self, id: &str) -> StoreResult<bool> {
        let result = self.comments().delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}

struct MongoTransaction {
    store: MongoStore,
    session: ClientSession,
}

#[async_trait]
impl Transaction for MongoTransaction {
    async fn insert_quiz(&mut self, quiz: &Quiz) -> StoreResult<()> {
        self.store
            .quizzes()
            .insert_one(quiz)
            .session(&mut self.session)
            .await
            .map_err(|e| write_error(e, format!("quiz {}", quiz.id)))?;
        Ok(())
    }

    async fn insert_questions(&mut self, questions: &[Question]) -> StoreResult<()> {
        if questions.is_empty() {
            return Ok(());
        }
        self.store
            .questions()
            .insert_many(questions)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn insert_options(&mut self, options: &[QuizOption]) -> StoreResult<()> {
        if options.is_empty() {
            return Ok(());
        }
        self.store
            .options()
            .insert_many(options)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn count_attempts(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<u64> {
        Ok(self
            .store
            .attempts()
            .count_documents(doc! { "quiz_id": quiz_id, "user_id": user_id })
            .session(&mut self.session)
            .await?)
    }

    async fn insert_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        self.store
            .attempts()
            .insert_one(attempt)
            .session(&mut self.session)
            .await
            .map_err(|e| {
                write_error(
                    e,
                    format!(
                        "attempt {} of user {} on quiz {}",
                        attempt.attempt_number, attempt.user_id, attempt.quiz_id
                    ),
                )
            })?;
        Ok(())
    }

    async fn insert_answers(&mut self, answers: &[UserAnswer]) -> StoreResult<()> {
        if answers.is_empty() {
            return Ok(());
        }
        self.store
            .answers()
            .insert_many(answers)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn update_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        let completed_at = attempt.completed_at.map(chrono_to_bson);
        let result = self
            .store
            .attempts()
            .update_one(
                doc! { "_id": attempt.id.as_str() },
                doc! { "$set": {
                    "score": attempt.score,
                    "total_questions": attempt.total_questions,
                    "percentage": attempt.percentage,
                    "time_taken_minutes": attempt.time_taken_minutes,
                    "completedAt": completed_at,
                } },
            )
            .session(&mut self.session)
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("attempt {}", attempt.id)));
        }
        Ok(())
    }

    async fn has_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = QuizLike::key(quiz_id, user_id);
        Ok(self
            .store
            .likes()
            .find_one(doc! { "_id": key })
            .session(&mut self.session)
            .await?
            .is_some())
    }

    async fn insert_like(&mut self, like: &QuizLike) -> StoreResult<()> {
        self.store
            .likes()
            .insert_one(like)
            .session(&mut self.session)
            .await
            .map_err(|e| write_error(e, format!("like {}", like.id)))?;
        Ok(())
    }

    async fn delete_like(&mut self, quiz_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = QuizLike::key(quiz_id, user_id);
        let result = self
            .store
            .likes()
            .delete_one(doc! { "_id": key })
            .session(&mut self.session)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn adjust_likes(&mut self, quiz_id: &str, delta: i64) -> StoreResult<()> {
        let result = self
            .store
            .quizzes()
            .update_one(
                doc! { "_id": quiz_id },
                doc! { "$inc": { "likes_count": delta } },
            )
            .session(&mut self.session)
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("quiz {}", quiz_id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.session.commit_transaction().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionRunner for MongoStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let session = self.start_transaction().await?;
        Ok(Box::new(MongoTransaction {
            store: self.clone(),
            session,
        }))
    }
}

#[async_trait]
impl HealthCheck for MongoStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
