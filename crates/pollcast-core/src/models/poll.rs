//! Poll model - question type, options, settings and counters.

use crate::error::{Error, Result};
use crate::identity::{Identity, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque poll identifier (hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(String);

impl PollId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id for a poll created by `creator` at `now`.
    pub fn generate(creator: &UserId, now: u64) -> Self {
        let nonce: u64 = rand::random();
        let mut hasher = blake3::Hasher::new();
        hasher.update(creator.as_str().as_bytes());
        hasher.update(&now.to_be_bytes());
        hasher.update(&nonce.to_be_bytes());
        let hash = hasher.finalize();
        Self(hex::encode(&hash.as_bytes()[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PollId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Option identifier, unique within its poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(String);

impl OptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id for the option at `index` with display `text`.
    ///
    /// Text is part of the digest so replacing an option list never reuses
    /// an id for a different answer.
    fn derive(poll_id: &PollId, index: usize, text: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(poll_id.as_str().as_bytes());
        hasher.update(&(index as u64).to_be_bytes());
        hasher.update(text.as_bytes());
        Self(hex::encode(&hasher.finalize().as_bytes()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&OptionId> for OptionId {
    fn from(id: &OptionId) -> Self {
        id.clone()
    }
}

/// Kind of question a poll asks. Fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one option per vote
    #[default]
    Single,
    /// One or more options per vote
    Multiple,
    /// Free text response
    Text,
}

impl QuestionType {
    pub fn is_choice(self) -> bool {
        !matches!(self, QuestionType::Text)
    }
}

/// A selectable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
    pub vote_count: u64,
}

/// Voting behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollSettings {
    /// Reject anonymous identities
    pub require_login: bool,

    /// Allow an identity to replace its vote
    pub allow_multiple_votes: bool,

    /// Voting closes once this instant (unix millis) has passed
    pub end_date: Option<u64>,

    /// Show aggregates to everyone, not just the creator
    pub show_results: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            require_login: false,
            allow_multiple_votes: false,
            end_date: None,
            show_results: true,
        }
    }
}

/// A poll with its authoritative counters.
///
/// `total_votes` counts ledger entries, not selections: a multiple-choice
/// vote touches several option counters but adds one to the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub settings: PollSettings,
    pub total_votes: u64,
    pub is_active: bool,
    pub creator: UserId,
    pub created_at: u64,
}

impl Poll {
    /// Build a validated poll with zeroed counters.
    pub fn new(
        id: PollId,
        creator: UserId,
        question_type: QuestionType,
        option_texts: Vec<String>,
        settings: PollSettings,
        created_at: u64,
    ) -> Result<Self> {
        let options = build_options(&id, question_type, option_texts)?;
        Ok(Self {
            id,
            question_type,
            options,
            settings,
            total_votes: 0,
            is_active: true,
            creator,
            created_at,
        })
    }

    pub fn option(&self, id: &OptionId) -> Option<&PollOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    pub(crate) fn option_mut(&mut self, id: &OptionId) -> Option<&mut PollOption> {
        self.options.iter_mut().find(|o| &o.id == id)
    }

    pub fn has_option(&self, id: &OptionId) -> bool {
        self.option(id).is_some()
    }

    /// True once `settings.end_date` lies in the past.
    pub fn is_expired(&self, now: u64) -> bool {
        self.settings.end_date.is_some_and(|end| end < now)
    }

    pub fn is_creator(&self, identity: &Identity) -> bool {
        identity.user_id() == Some(&self.creator)
    }

    /// Replace the option list. Only legal before the first vote.
    pub fn replace_options(&mut self, option_texts: Vec<String>) -> Result<()> {
        if self.total_votes > 0 {
            return Err(Error::validation(
                "cannot update options after voting has started",
            ));
        }
        self.options = build_options(&self.id, self.question_type, option_texts)?;
        Ok(())
    }

    /// Sum of all option counters.
    pub fn total_selections(&self) -> u64 {
        self.options.iter().map(|o| o.vote_count).sum()
    }
}

fn build_options(
    poll_id: &PollId,
    question_type: QuestionType,
    option_texts: Vec<String>,
) -> Result<Vec<PollOption>> {
    if !question_type.is_choice() {
        if !option_texts.is_empty() {
            return Err(Error::validation("text polls do not take options"));
        }
        return Ok(Vec::new());
    }

    let texts: Vec<String> = option_texts
        .into_iter()
        .map(|t| t.trim().to_string())
        .collect();
    if texts.iter().any(String::is_empty) {
        return Err(Error::validation("option text cannot be empty"));
    }
    if texts.len() < 2 {
        return Err(Error::validation("choice polls need at least two options"));
    }

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| PollOption {
            id: OptionId::derive(poll_id, index, &text),
            text,
            vote_count: 0,
        })
        .collect())
}

/// Request to create a poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPoll {
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub settings: PollSettings,
}

/// Partial update of a poll. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollUpdate {
    pub options: Option<Vec<String>>,
    pub settings: Option<PollSettings>,
    pub is_active: Option<bool>,
}
