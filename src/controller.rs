use std::collections::BTreeMap;

use rand::Rng;

use crate::quiz::opentdb::{QuestionSource, TriviaQuestion};
use crate::quiz::scores::{self, ScoreRecord};
use crate::quiz::{group_name, player, Answer, Question, QUESTIONS_PER_ROUND};
use crate::storage::{KeyValueStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Page {
    pub username_input: String,
    pub new_player_visible: bool,
    pub loading: bool,
    pub questions: Vec<Question>,
    // group name -> option index
    pub checked: BTreeMap<String, usize>,
    pub leaderboard: Vec<ScoreRecord>,
}

impl Page {
    /// Returns false when there is no such group or option.
    pub fn check(&mut self, group: &str, option: usize) -> bool {
        let has_option = self
            .group_index(group)
            .and_then(|index| self.questions.get(index))
            .is_some_and(|question| option < question.answers.len());
        if has_option {
            self.checked.insert(group.to_string(), option);
        }
        has_option
    }

    pub fn checked_answer(&self, index: usize) -> Option<&Answer> {
        let option = *self.checked.get(&group_name(index))?;
        self.questions.get(index)?.answers.get(option)
    }

    pub fn group_index(&self, group: &str) -> Option<usize> {
        (0..self.questions.len()).find(|&index| group_name(index) == group)
    }

    pub fn score(&self) -> u32 {
        (0..self.questions.len())
            .filter_map(|index| self.checked_answer(index))
            .filter(|answer| answer.is_correct)
            .count() as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Ignored,
    Recorded(ScoreRecord),
}

pub struct QuizController<'a, R> {
    source: &'a dyn QuestionSource,
    session: &'a dyn KeyValueStore,
    durable: &'a dyn KeyValueStore,
    rng: R,
}

impl<'a, R: Rng + Send> QuizController<'a, R> {
    pub fn new(
        source: &'a dyn QuestionSource,
        session: &'a dyn KeyValueStore,
        durable: &'a dyn KeyValueStore,
        rng: R,
    ) -> Self {
        Self {
            source,
            session,
            durable,
            rng,
        }
    }

    pub async fn start(&mut self, page: &mut Page) {
        self.check_identity(page);
        self.fetch_questions(page).await;
        self.render_leaderboard(page);
    }

    pub fn check_identity(&self, page: &mut Page) {
        page.new_player_visible = player::active(self.session).is_some();
    }

    /// When the request fails, the question area is left empty.
    pub async fn fetch_questions(&mut self, page: &mut Page) {
        page.loading = true;

        match self.source.fetch(QUESTIONS_PER_ROUND).await {
            Ok(questions) => {
                log::debug!("Fetched {} questions", questions.len());
                self.render_questions(page, questions);
            }
            Err(err) => {
                log::error!("Error fetching questions: {}", err);
                page.questions.clear();
                page.checked.clear();
            }
        }

        page.loading = false;
    }

    pub fn render_questions(&mut self, page: &mut Page, questions: Vec<TriviaQuestion>) {
        page.checked.clear();
        page.questions = questions
            .into_iter()
            .map(|trivia| Question::from_trivia(trivia, &mut self.rng))
            .collect();
    }

    pub async fn submit(&mut self, page: &mut Page) -> Result<SubmitOutcome, StoreError> {
        let (player, entered) = match player::active(self.session) {
            Some(player) => (player, false),
            None => {
                let entered = page.username_input.trim();
                if entered.is_empty() {
                    return Ok(SubmitOutcome::Ignored);
                }
                (entered.to_string(), true)
            }
        };

        let record = ScoreRecord::new(player, page.score());
        log::debug!("{} scored {}", record.player, record.score);
        scores::append(self.durable, record.clone())?;
        if entered {
            player::remember(self.session, &record.player)?;
        }

        self.render_leaderboard(page);
        self.fetch_questions(page).await;
        self.check_identity(page);

        Ok(SubmitOutcome::Recorded(record))
    }

    pub fn new_player(&self, page: &mut Page) -> Result<(), StoreError> {
        player::forget(self.session)?;
        page.username_input.clear();
        self.check_identity(page);
        Ok(())
    }

    pub fn render_leaderboard(&self, page: &mut Page) {
        page.leaderboard = scores::load(self.durable);
    }
}
