use serde::{Deserialize, Serialize};

use crate::tmdb::MovieSummary;

/// What the player is guessing for the current movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuessMode {
    Year,
    Director,
}

/// Transient result message for the last guess. Cleared by the owner of the
/// scheduled clear task, or replaced wholesale by the next guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub text: String,
    pub correct: bool,
}

/// The quiz itself: a fixed sequence of movies, a cursor, and a score.
///
/// Plain value type with no timers or locks; the transitions below are the
/// whole public surface and keep `0 <= index <= movies.len()`. Once the
/// cursor reaches the end the quiz is finished and only `restart` is
/// accepted.
#[derive(Debug, Clone)]
pub struct QuizState {
    movies: Vec<MovieSummary>,
    index: usize,
    score: u32,
    mode: GuessMode,
    feedback: Option<Feedback>,
    finished: bool,
}

impl QuizState {
    pub fn new(movies: Vec<MovieSummary>) -> Self {
        let finished = movies.is_empty();
        Self {
            movies,
            index: 0,
            score: 0,
            mode: GuessMode::Year,
            feedback: None,
            finished,
        }
    }

    pub fn current_movie(&self) -> Option<&MovieSummary> {
        if self.finished {
            return None;
        }
        self.movies.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.movies.len()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn mode(&self) -> GuessMode {
        self.mode
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Score the guess against the current movie and advance to the next one.
    /// Returns `None` once the quiz is finished; nothing changes in that case.
    pub fn submit_guess(&mut self, guess: &str) -> Option<Feedback> {
        if self.finished {
            return None;
        }
        let movie = &self.movies[self.index];
        let answer = match self.mode {
            GuessMode::Year => movie.release_year().unwrap_or_default().to_string(),
            GuessMode::Director => movie.director.clone(),
        };
        let correct = guess_matches(guess, &answer, self.mode);
        let text = if correct {
            format!("Correct! The answer was {answer}")
        } else {
            format!("Wrong. The answer was {answer}.")
        };
        let feedback = Feedback { text, correct };
        self.feedback = Some(feedback.clone());
        if correct {
            self.score += 1;
        }
        self.index += 1;
        if self.index == self.movies.len() {
            self.finished = true;
        }
        Some(feedback)
    }

    /// Switch the guess target without touching score or cursor. Ignored once
    /// the quiz is finished.
    pub fn set_mode(&mut self, mode: GuessMode) -> bool {
        if self.finished {
            return false;
        }
        self.mode = mode;
        true
    }

    /// Back to the first movie with a zeroed score. Only valid from the
    /// finished state.
    pub fn restart(&mut self) -> bool {
        if !self.finished {
            return false;
        }
        self.index = 0;
        self.score = 0;
        self.feedback = None;
        self.finished = self.movies.is_empty();
        true
    }

    pub fn clear_feedback(&mut self) {
        self.feedback = None;
    }
}

/// Case-insensitive exact match on the normalized answer; in director mode
/// the surname alone is also accepted.
fn guess_matches(guess: &str, answer: &str, mode: GuessMode) -> bool {
    let guess = guess.trim().to_lowercase();
    if guess.is_empty() || answer.is_empty() {
        return false;
    }
    let answer = answer.to_lowercase();
    if guess == answer {
        return true;
    }
    mode == GuessMode::Director && Some(guess.as_str()) == answer.split_whitespace().last()
}
