//! Pollcast Core - poll/vote consistency and notification engine
//!
//! Records votes from many concurrent callers against shared polls, keeps the
//! per-option and per-poll counters equal to what the vote ledger says, and
//! signals observers when a poll changes.
//!
//! # Architecture
//!
//! - **Models**: Polls, options, ledger entries ([`Poll`], [`Vote`])
//! - **Identity**: Voter identity and the resolver contract
//! - **Store**: Poll Store + Vote Ledger trait, in-memory implementation
//! - **Aggregator**: Counter maintenance on the write path
//! - **Recorder**: The vote submission state machine
//! - **Results**: Aggregates and vote checks
//! - **Notifier**: Per-poll publish/subscribe change signals
//!
//! # Example
//!
//! ```no_run
//! use pollcast_core::{Ballot, Identity, MemoryStore, NewPoll, Notifier, PollEngine};
//! use std::sync::Arc;
//!
//! # async fn demo() -> pollcast_core::Result<()> {
//! let engine = PollEngine::new(Arc::new(MemoryStore::new()), Arc::new(Notifier::default()));
//! let owner = Identity::user("alice");
//! let poll = engine
//!     .create_poll(&owner, NewPoll { options: vec!["Yes".into(), "No".into()], ..Default::default() })
//!     .await?;
//!
//! let yes = poll.options[0].id.clone();
//! engine.submit_vote(&poll.id, Identity::user("bob"), Ballot::choices([yes])).await?;
//! let stats = engine.get_aggregates(&poll.id, &owner)?;
//! assert_eq!(stats.total_votes(), 1);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod engine;
pub mod error;
pub mod identity;
pub mod models;
pub mod notifier;
pub mod recorder;
pub mod results;
pub mod store;

pub use engine::PollEngine;
pub use error::{Error, Result};
pub use identity::{AnonymousOrigin, CallerContext, Identity, IdentityResolver, OriginResolver, UserId};
pub use models::{
    now_millis, Ballot, NewPoll, OptionId, Poll, PollId, PollOption, PollSettings, PollUpdate,
    QuestionType, Vote, VoteOutcome,
};
pub use notifier::{Notifier, Observer, ObserverId, PollChanged};
pub use results::{OptionStats, PollStats, PriorVote, TextResponse, VoteStatus};
pub use store::{MemoryStore, PollStore};
