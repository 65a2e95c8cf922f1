pub mod opentdb;
pub mod player;
pub mod scores;

use rand::seq::SliceRandom;
use rand::Rng;

use opentdb::TriviaQuestion;

/// Number of questions requested for every round.
pub const QUESTIONS_PER_ROUND: usize = 10;

pub fn group_name(index: usize) -> String {
    format!("answer{}", index)
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub text: String,
    pub category: String,
    pub difficulty: String,
    pub answers: Vec<Answer>,
}

impl Question {
    pub fn from_trivia<R: Rng + ?Sized>(trivia: TriviaQuestion, rng: &mut R) -> Self {
        // We shuffle the answers so the correct one isn't always the first one
        let answers = {
            let mut shuffled_answers = vec![Answer::new(trivia.correct_answer, true)];
            shuffled_answers.extend(
                trivia
                    .incorrect_answers
                    .into_iter()
                    .map(|a| Answer::new(a, false)),
            );
            shuffled_answers.shuffle(rng);
            shuffled_answers
        };

        Self {
            text: trivia.question,
            category: trivia.category,
            difficulty: trivia.difficulty,
            answers,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Answer {
    pub text: String,
    pub is_correct: bool,
}

impl Answer {
    pub fn new(text: String, is_correct: bool) -> Self {
        Self { text, is_correct }
    }
}
