//! Result aggregation for a stored attempt: per-question verdicts, option
//! popularity across every attempt of the quiz, and discussion threads.

use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::models::quiz::{
    OptionStat, Question, QuestionResult, QuizAttempt, QuizOption, QuizResultResponse, UserAnswer,
};
use crate::services::comment_service::CommentService;
use crate::store::Repositories;

/// Share of all attempts on the quiz that picked each option.
/// The denominator never drops below one.
pub fn build_option_stats(
    options: &[QuizOption],
    counts: &HashMap<String, u64>,
    total_attempts: usize,
) -> Vec<OptionStat> {
    let denominator = total_attempts.max(1) as f64;
    options
        .iter()
        .map(|option| {
            let selection_count = counts.get(&option.id).copied().unwrap_or(0);
            OptionStat {
                option_id: option.id.clone(),
                text: option.text.clone(),
                is_correct: option.is_correct,
                selection_count,
                percentage: selection_count as f64 * 100.0 / denominator,
            }
        })
        .collect()
}

/// A question counts as correct only when the chosen option is flagged correct
fn answer_is_correct(answer: Option<&UserAnswer>, options: &[QuizOption]) -> bool {
    answer
        .and_then(|a| a.option_id.as_deref())
        .and_then(|id| options.iter().find(|o| o.id == id))
        .map(|o| o.is_correct)
        .unwrap_or(false)
}

pub struct ResultService {
    repos: Repositories,
}

impl ResultService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub async fn result(&self, attempt_id: &str) -> AppResult<QuizResultResponse> {
        let attempt = self
            .repos
            .quizzes
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::not_found("Attempt not found"))?;
        self.build(attempt).await
    }

    /// Caller's most recent attempt on the quiz
    pub async fn latest_result(&self, quiz_id: &str, user_id: &str) -> AppResult<QuizResultResponse> {
        let attempt = self
            .repos
            .quizzes
            .attempts_for_quiz(quiz_id)
            .await?
            .into_iter()
            .filter(|a| a.user_id == user_id)
            .max_by_key(|a| a.attempt_number)
            .ok_or_else(|| AppError::not_found("No attempts for this quiz"))?;
        self.build(attempt).await
    }

    async fn build(&self, attempt: QuizAttempt) -> AppResult<QuizResultResponse> {
        let quiz = self
            .repos
            .quizzes
            .find_quiz(&attempt.quiz_id)
            .await?
            .ok_or_else(|| AppError::not_found("Quiz not found"))?;

        let questions = self.repos.quizzes.questions_for_quiz(&quiz.id).await?;
        let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();

        let mut options: HashMap<String, Vec<QuizOption>> = HashMap::new();
        for option in self.repos.quizzes.options_for_questions(&question_ids).await? {
            options.entry(option.question_id.clone()).or_default().push(option);
        }

        let answers: HashMap<String, UserAnswer> = self
            .repos
            .quizzes
            .answers_for_attempt(&attempt.id)
            .await?
            .into_iter()
            .map(|a| (a.question_id.clone(), a))
            .collect();

        let counts = self.repos.quizzes.option_selection_counts(&quiz.id).await?;
        let total_attempts = self.repos.quizzes.attempts_for_quiz(&quiz.id).await?.len();

        let mut comments = CommentService::new(self.repos.clone())
            .views_for_questions(&question_ids)
            .await?;

        let questions = questions
            .into_iter()
            .map(|question: Question| {
                let question_options = options.remove(&question.id).unwrap_or_default();
                let answer = answers.get(&question.id);
                QuestionResult {
                    is_correct: answer_is_correct(answer, &question_options),
                    options: build_option_stats(&question_options, &counts, total_attempts),
                    user_answer: answer.map(|a| a.answer_text.clone()),
                    user_option_id: answer.and_then(|a| a.option_id.clone()),
                    comments: comments.remove(&question.id).unwrap_or_default(),
                    question_id: question.id,
                    question_text: question.question_text,
                    explanation: question.explanation,
                    correct_answer: question.correct_answer,
                }
            })
            .collect();

        Ok(QuizResultResponse {
            attempt_id: attempt.id,
            quiz_id: quiz.id,
            quiz_title: quiz.title,
            score: attempt.score,
            total_questions: attempt.total_questions,
            percentage: attempt.percentage,
            time_taken_minutes: attempt.time_taken_minutes,
            attempt_number: attempt.attempt_number,
            completed_at: attempt.completed_at,
            questions,
        })
    }
}
