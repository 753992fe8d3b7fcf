//! Quiz authoring, taking and scoring.
//!
//! Submission runs as one transaction: the attempt row, its answers and the
//! final score become visible together or not at all.

use chrono::Utc;
use std::collections::HashMap;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::metrics::{record_submission, QUIZ_LIKE_TOGGLES_TOTAL, QUIZ_SUBMISSION_PERCENTAGE};
use crate::models::community::{Community, CommunityRelation};
use crate::models::quiz::{
    AttemptSummary, CreateQuestionRequest, CreateQuizRequest, LeaderboardEntry, LikeStatus,
    Question, Quiz, QuizAttempt, QuizCommunityInfo, QuizCreatorInfo, QuizDetail, QuizLike, QuizListItem,
    QuizOption, SubmitQuizRequest, SubmittedAnswer, TakeOption, TakeQuestion, TakeQuiz,
    UserAnswer,
};
use crate::models::user::{User, UserSummary};
use crate::services::community_service::CommunityService;
use crate::store::Repositories;
use crate::utils::time::{format_relative, is_new};

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const MAX_LEADERBOARD_SIZE: usize = 100;

/// `100 * score / total`, zero for an empty quiz
pub fn percentage(score: i32, total: i32) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    f64::from(score) * 100.0 / f64::from(total)
}

/// Positional exact-match scoring: `answers[i]` is graded against `questions[i]`
pub fn grade(questions: &[Question], answers: &[String]) -> (i32, Vec<bool>) {
    let verdicts: Vec<bool> = questions
        .iter()
        .zip(answers)
        .map(|(q, a)| *a == q.correct_answer)
        .collect();
    let score = verdicts.iter().filter(|c| **c).count() as i32;
    (score, verdicts)
}

/// First completed attempts ranked by score, then speed, then submission time
pub fn rank_first_attempts(attempts: &[QuizAttempt]) -> Vec<&QuizAttempt> {
    let mut firsts: Vec<&QuizAttempt> = attempts
        .iter()
        .filter(|a| a.attempt_number == 1 && a.completed_at.is_some())
        .collect();
    firsts.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.time_taken_minutes.cmp(&b.time_taken_minutes))
            .then(a.completed_at.cmp(&b.completed_at))
    });
    firsts
}

/// Mean score and count of first attempts
fn first_attempt_stats(attempts: &[QuizAttempt]) -> (f64, usize) {
    let firsts: Vec<&QuizAttempt> = attempts
        .iter()
        .filter(|a| a.attempt_number == 1 && a.completed_at.is_some())
        .collect();
    if firsts.is_empty() {
        return (0.0, 0);
    }
    let total: i64 = firsts.iter().map(|a| i64::from(a.score)).sum();
    (total as f64 / firsts.len() as f64, firsts.len())
}

/// Options grouped by question, keeping store order
fn options_by_question(options: Vec<QuizOption>) -> HashMap<String, Vec<QuizOption>> {
    let mut grouped: HashMap<String, Vec<QuizOption>> = HashMap::new();
    for option in options {
        grouped
            .entry(option.question_id.clone())
            .or_default()
            .push(option);
    }
    grouped
}

fn build_question(quiz_id: &str, order_index: i32, req: &CreateQuestionRequest) -> (Question, Vec<QuizOption>) {
    let question = Question {
        id: uuid::Uuid::new_v4().to_string(),
        quiz_id: quiz_id.to_string(),
        question_text: req.question_text.trim().to_string(),
        explanation: req.explanation.clone(),
        correct_answer: req.correct_answer.clone(),
        order_index,
    };
    let options = req
        .options
        .iter()
        .enumerate()
        .map(|(position, o)| QuizOption {
            id: uuid::Uuid::new_v4().to_string(),
            question_id: question.id.clone(),
            text: o.text.clone(),
            is_correct: o.is_correct,
            position: position as i32,
        })
        .collect();
    (question, options)
}

pub struct QuizService {
    repos: Repositories,
}

impl QuizService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    async fn load(&self, id: &str) -> AppResult<Quiz> {
        self.repos
            .quizzes
            .find_quiz(id)
            .await?
            .ok_or_else(|| AppError::not_found("Quiz not found"))
    }

    /// Unpublished quizzes exist only for their creator
    async fn load_visible(&self, id: &str, caller: Option<&str>) -> AppResult<Quiz> {
        let quiz = self.load(id).await?;
        if !quiz.is_published && caller != Some(quiz.creator_id.as_str()) {
            return Err(AppError::not_found("Quiz not found"));
        }
        Ok(quiz)
    }

    pub async fn create(&self, user_id: &str, req: CreateQuizRequest) -> AppResult<String> {
        req.validate()?;

        let community = self
            .repos
            .communities
            .find_community(&req.community_id)
            .await?
            .ok_or_else(|| AppError::not_found("Community not found"))?;
        CommunityService::new(self.repos.clone())
            .ensure_can_create_quiz(&community, user_id)
            .await?;

        let now = Utc::now();
        let quiz = Quiz {
            id: uuid::Uuid::new_v4().to_string(),
            community_id: community.id.clone(),
            creator_id: user_id.to_string(),
            title: req.title.trim().to_string(),
            description: req.description.clone(),
            duration_minutes: req.duration_minutes,
            likes_count: 0,
            is_published: req.is_published,
            created_at: now,
            updated_at: now,
        };

        // Stable sort keeps submission order for equal indexes; stored indexes are dense
        let mut ordered: Vec<&CreateQuestionRequest> = req.questions.iter().collect();
        ordered.sort_by_key(|q| q.order_index);

        let mut questions = Vec::with_capacity(ordered.len());
        let mut options = Vec::new();
        for (index, q) in ordered.into_iter().enumerate() {
            let (question, question_options) = build_question(&quiz.id, index as i32, q);
            questions.push(question);
            options.extend(question_options);
        }

        let mut tx = self.repos.transactions.begin().await?;
        tx.insert_quiz(&quiz).await?;
        tx.insert_questions(&questions).await?;
        tx.insert_options(&options).await?;
        tx.commit().await?;

        tracing::info!(
            quiz_id = %quiz.id,
            community_id = %community.id,
            questions = questions.len(),
            "Quiz created"
        );
        Ok(quiz.id)
    }

    pub async fn list(&self, caller: &str) -> AppResult<Vec<QuizListItem>> {
        let quizzes = self.repos.quizzes.list_published_quizzes().await?;
        let liked = self.repos.quizzes.liked_quiz_ids(caller).await?;

        let creator_ids: Vec<String> = quizzes.iter().map(|q| q.creator_id.clone()).collect();
        let creators = self.users_by_id(&creator_ids).await?;

        let mut communities: HashMap<String, Option<Community>> = HashMap::new();
        let mut items = Vec::with_capacity(quizzes.len());
        for quiz in quizzes {
            if !communities.contains_key(&quiz.community_id) {
                let community = self
                    .repos
                    .communities
                    .find_community(&quiz.community_id)
                    .await?;
                communities.insert(quiz.community_id.clone(), community);
            }
            let community = communities.get(&quiz.community_id).and_then(Option::as_ref);
            let community_info = self.community_info(community, caller).await?;
            let creator = self
                .creator_info(community, creators.get(&quiz.creator_id))
                .await?;
            let is_liked = liked.contains(&quiz.id);
            items.push(self.list_item(quiz, community_info, creator, is_liked).await?);
        }
        Ok(items)
    }

    pub async fn get(&self, id: &str, caller: &str) -> AppResult<QuizDetail> {
        let quiz = self.load_visible(id, Some(caller)).await?;
        let is_liked = self.repos.quizzes.has_like(&quiz.id, caller).await?;
        let community = self
            .repos
            .communities
            .find_community(&quiz.community_id)
            .await?;
        let community_info = self.community_info(community.as_ref(), caller).await?;
        let creator_user = self.repos.users.find_user(&quiz.creator_id).await?;
        let creator = self
            .creator_info(community.as_ref(), creator_user.as_ref())
            .await?;

        let attempts = self.repos.quizzes.attempts_for_quiz(&quiz.id).await?;
        let leaderboard = self
            .leaderboard_from(&attempts, DEFAULT_LEADERBOARD_SIZE)
            .await?;
        let current_attempt_id = attempts
            .iter()
            .filter(|a| a.user_id == caller)
            .max_by_key(|a| a.attempt_number)
            .map(|a| a.id.clone());

        Ok(QuizDetail {
            quiz: self
                .list_item(quiz, community_info, creator, is_liked)
                .await?,
            leaderboard,
            current_attempt_id,
        })
    }

    pub async fn take(&self, id: &str, caller: &str) -> AppResult<TakeQuiz> {
        let quiz = self.load_visible(id, Some(caller)).await?;
        let questions = self.repos.quizzes.questions_for_quiz(&quiz.id).await?;
        let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        let mut options =
            options_by_question(self.repos.quizzes.options_for_questions(&question_ids).await?);

        let questions = questions
            .into_iter()
            .map(|q| TakeQuestion {
                options: options
                    .remove(&q.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| TakeOption {
                        option_id: o.id,
                        text: o.text,
                    })
                    .collect(),
                question_id: q.id,
                question_text: q.question_text,
            })
            .collect();

        Ok(TakeQuiz {
            quiz_id: quiz.id,
            title: quiz.title,
            duration: quiz.duration_minutes,
            questions,
        })
    }

    /// Scores a submission and stores it as the caller's next attempt.
    /// Returns the attempt id.
    pub async fn submit(
        &self,
        quiz_id: &str,
        user_id: &str,
        req: SubmitQuizRequest,
    ) -> AppResult<String> {
        let result = self.submit_inner(quiz_id, user_id, req).await;
        match &result {
            Ok(_) => record_submission("stored"),
            Err(AppError::Validation { code, .. }) => record_submission(code),
            Err(_) => record_submission("error"),
        }
        result
    }

    async fn submit_inner(
        &self,
        quiz_id: &str,
        user_id: &str,
        req: SubmitQuizRequest,
    ) -> AppResult<String> {
        let quiz = self.load_visible(quiz_id, Some(user_id)).await?;

        if req.duration_minutes < 0 {
            return Err(AppError::validation_code(
                "INVALID_DURATION",
                "Duration cannot be negative",
            ));
        }
        if req.duration_minutes > quiz.duration_minutes {
            tracing::warn!(quiz_id, user_id, "Submission after the time limit");
            return Err(AppError::validation_code(
                "TIME_OUT",
                "Time is up: the submission exceeded the quiz duration",
            ));
        }

        let questions = self.repos.quizzes.questions_for_quiz(&quiz.id).await?;
        if questions.is_empty() {
            return Err(AppError::validation_code(
                "EMPTY_QUIZ",
                "Quiz has no questions",
            ));
        }
        if req.answers.len() != questions.len() {
            return Err(AppError::validation_code(
                "ANSWER_COUNT_MISMATCH",
                format!(
                    "Expected {} answers, got {}",
                    questions.len(),
                    req.answers.len()
                ),
            ));
        }

        let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        let options = self.repos.quizzes.options_for_questions(&question_ids).await?;
        let answer_texts = resolve_answer_texts(&questions, &options, &req.answers)?;

        let (score, _) = grade(&questions, &answer_texts);
        let total = questions.len() as i32;

        let mut tx = self.repos.transactions.begin().await?;
        let prior = tx.count_attempts(&quiz.id, user_id).await?;

        let mut attempt = QuizAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            quiz_id: quiz.id.clone(),
            user_id: user_id.to_string(),
            score: 0,
            total_questions: total,
            percentage: 0.0,
            time_taken_minutes: req.duration_minutes,
            attempt_number: prior as i32 + 1,
            completed_at: None,
        };
        tx.insert_attempt(&attempt).await?;

        let answers: Vec<UserAnswer> = questions
            .iter()
            .zip(req.answers.iter().zip(answer_texts))
            .map(|(question, (submitted, text))| UserAnswer {
                id: uuid::Uuid::new_v4().to_string(),
                attempt_id: attempt.id.clone(),
                quiz_id: quiz.id.clone(),
                question_id: question.id.clone(),
                option_id: submitted.option_id.clone(),
                answer_text: text,
            })
            .collect();
        tx.insert_answers(&answers).await?;

        attempt.score = score;
        attempt.percentage = percentage(score, total);
        attempt.completed_at = Some(Utc::now());
        tx.update_attempt(&attempt).await?;
        tx.commit().await?;

        QUIZ_SUBMISSION_PERCENTAGE.observe(attempt.percentage);
        tracing::info!(
            quiz_id,
            user_id,
            attempt_id = %attempt.id,
            attempt_number = attempt.attempt_number,
            score,
            "Quiz submitted"
        );
        Ok(attempt.id)
    }

    pub async fn toggle_like(&self, quiz_id: &str, user_id: &str) -> AppResult<LikeStatus> {
        let quiz = self.load_visible(quiz_id, Some(user_id)).await?;

        let mut tx = self.repos.transactions.begin().await?;
        let status = if tx.has_like(&quiz.id, user_id).await? {
            if !tx.delete_like(&quiz.id, user_id).await? {
                return Err(AppError::not_found("Like not found"));
            }
            tx.adjust_likes(&quiz.id, -1).await?;
            LikeStatus::Unliked
        } else {
            tx.insert_like(&QuizLike::new(&quiz.id, user_id)).await?;
            tx.adjust_likes(&quiz.id, 1).await?;
            LikeStatus::Liked
        };
        tx.commit().await?;

        let action = match status {
            LikeStatus::Liked => "liked",
            LikeStatus::Unliked => "unliked",
        };
        QUIZ_LIKE_TOGGLES_TOTAL.with_label_values(&[action]).inc();
        tracing::info!(quiz_id, user_id, action, "Like toggled");
        Ok(status)
    }

    pub async fn leaderboard(
        &self,
        quiz_id: &str,
        caller: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<LeaderboardEntry>> {
        let quiz = self.load_visible(quiz_id, Some(caller)).await?;
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
            .clamp(1, MAX_LEADERBOARD_SIZE);
        let attempts = self.repos.quizzes.attempts_for_quiz(&quiz.id).await?;
        self.leaderboard_from(&attempts, limit).await
    }

    /// Caller's attempts on the quiz, newest first
    pub async fn my_attempts(&self, quiz_id: &str, user_id: &str) -> AppResult<Vec<AttemptSummary>> {
        let quiz = self.load_visible(quiz_id, Some(user_id)).await?;
        let mut attempts: Vec<QuizAttempt> = self
            .repos
            .quizzes
            .attempts_for_quiz(&quiz.id)
            .await?
            .into_iter()
            .filter(|a| a.user_id == user_id)
            .collect();
        attempts.sort_by(|a, b| b.attempt_number.cmp(&a.attempt_number));
        Ok(attempts.iter().map(AttemptSummary::from).collect())
    }

    /// Appends a question after the existing ones
    pub async fn add_question(
        &self,
        quiz_id: &str,
        user_id: &str,
        req: CreateQuestionRequest,
    ) -> AppResult<String> {
        req.validate()?;
        let quiz = self.load(quiz_id).await?;
        if quiz.creator_id != user_id {
            return Err(AppError::forbidden(
                "Only the quiz creator can add questions",
            ));
        }

        let existing = self.repos.quizzes.questions_for_quiz(&quiz.id).await?;
        let next_index = existing
            .iter()
            .map(|q| q.order_index + 1)
            .max()
            .unwrap_or(0);
        let (question, options) = build_question(&quiz.id, next_index, &req);

        let mut tx = self.repos.transactions.begin().await?;
        tx.insert_questions(std::slice::from_ref(&question)).await?;
        tx.insert_options(&options).await?;
        tx.commit().await?;

        tracing::info!(quiz_id, question_id = %question.id, "Question added");
        Ok(question.id)
    }

    /// Quiz creator or the creator of its community
    pub async fn delete(&self, quiz_id: &str, user_id: &str) -> AppResult<()> {
        let quiz = self.load(quiz_id).await?;
        let community_creator = self
            .repos
            .communities
            .find_community(&quiz.community_id)
            .await?
            .map(|c: Community| c.creator_id);
        if quiz.creator_id != user_id && community_creator.as_deref() != Some(user_id) {
            return Err(AppError::forbidden("You cannot delete this quiz"));
        }
        if !self.repos.quizzes.delete_quiz(quiz_id).await? {
            return Err(AppError::not_found("Quiz not found"));
        }
        tracing::info!(quiz_id, user_id, "Quiz deleted");
        Ok(())
    }

    pub async fn delete_question(&self, question_id: &str, user_id: &str) -> AppResult<()> {
        let question = self
            .repos
            .quizzes
            .find_question(question_id)
            .await?
            .ok_or_else(|| AppError::not_found("Question not found"))?;
        let quiz = self.load(&question.quiz_id).await?;
        if quiz.creator_id != user_id {
            return Err(AppError::forbidden(
                "Only the quiz creator can delete questions",
            ));
        }
        if !self.repos.quizzes.delete_question(question_id).await? {
            return Err(AppError::not_found("Question not found"));
        }
        tracing::info!(question_id, quiz_id = %quiz.id, "Question deleted");
        Ok(())
    }

    async fn users_by_id(&self, ids: &[String]) -> AppResult<HashMap<String, User>> {
        let mut unique: Vec<String> = ids.to_vec();
        unique.sort();
        unique.dedup();
        let users = self.repos.users.find_users(&unique).await?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    async fn community_info(
        &self,
        community: Option<&Community>,
        caller: &str,
    ) -> AppResult<Option<QuizCommunityInfo>> {
        let Some(community) = community else {
            return Ok(None);
        };
        let relation = CommunityService::new(self.repos.clone())
            .resolve_relation(community, Some(caller))
            .await?;
        Ok(Some(QuizCommunityInfo {
            id: community.id.clone(),
            name: community.name.clone(),
            is_joined: relation.is_joined(),
            member_role: relation,
        }))
    }

    async fn creator_info(
        &self,
        community: Option<&Community>,
        creator: Option<&User>,
    ) -> AppResult<Option<QuizCreatorInfo>> {
        let Some(user) = creator else {
            return Ok(None);
        };
        let role = match community {
            Some(community) => {
                CommunityService::new(self.repos.clone())
                    .resolve_relation(community, Some(&user.id))
                    .await?
            }
            None => CommunityRelation::NonMember,
        };
        Ok(Some(QuizCreatorInfo {
            user: UserSummary::from(user),
            role,
        }))
    }

    async fn list_item(
        &self,
        quiz: Quiz,
        community: Option<QuizCommunityInfo>,
        creator: Option<QuizCreatorInfo>,
        is_liked: bool,
    ) -> AppResult<QuizListItem> {
        let questions_count = self.repos.quizzes.questions_for_quiz(&quiz.id).await?.len();
        let attempts = self.repos.quizzes.attempts_for_quiz(&quiz.id).await?;
        let (average_score, students_count) = first_attempt_stats(&attempts);
        let now = Utc::now();

        Ok(QuizListItem {
            is_new: is_new(quiz.created_at, now),
            created_at_text: format_relative(quiz.created_at, now),
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            duration_minutes: quiz.duration_minutes,
            likes_count: quiz.likes_count,
            is_published: quiz.is_published,
            is_liked,
            questions_count,
            average_score,
            students_count,
            community,
            creator,
            created_at: quiz.created_at,
        })
    }

    async fn leaderboard_from(
        &self,
        attempts: &[QuizAttempt],
        limit: usize,
    ) -> AppResult<Vec<LeaderboardEntry>> {
        let ranked: Vec<&QuizAttempt> = rank_first_attempts(attempts)
            .into_iter()
            .take(limit)
            .collect();
        let user_ids: Vec<String> = ranked.iter().map(|a| a.user_id.clone()).collect();
        let users = self.users_by_id(&user_ids).await?;

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(index, attempt)| LeaderboardEntry {
                rank: index + 1,
                attempt_id: attempt.id.clone(),
                score: attempt.score,
                percentage: attempt.percentage,
                time_taken_minutes: attempt.time_taken_minutes,
                submitted_at: attempt.completed_at,
                user: users.get(&attempt.user_id).map(UserSummary::from),
            })
            .collect())
    }
}

/// Answer text per question. A chosen option must belong to its positional
/// question; an empty text with a chosen option takes the option's text.
fn resolve_answer_texts(
    questions: &[Question],
    options: &[QuizOption],
    answers: &[SubmittedAnswer],
) -> AppResult<Vec<String>> {
    let by_id: HashMap<&str, &QuizOption> = options.iter().map(|o| (o.id.as_str(), o)).collect();

    questions
        .iter()
        .zip(answers)
        .map(|(question, answer)| match answer.option_id.as_deref() {
            None => Ok(answer.answer_text.clone()),
            Some(option_id) => {
                let option = by_id
                    .get(option_id)
                    .filter(|o| o.question_id == question.id)
                    .ok_or_else(|| {
                        AppError::validation_code(
                            "INVALID_OPTION",
                            format!(
                                "Option {} does not belong to question {}",
                                option_id, question.id
                            ),
                        )
                    })?;
                if answer.answer_text.is_empty() {
                    Ok(option.text.clone())
                } else {
                    Ok(answer.answer_text.clone())
                }
            }
        })
        .collect()
}
