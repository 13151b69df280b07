//! The cheer-to-ranking engine.
//!
//! Each accepted cheer is one read-modify-write cycle against the store:
//! apply the bits delta, age the mover's tie-break priority, reset the
//! priority of every other game sitting at the mover's new total, write the
//! document back atomically, then republish the top ranks. The same engine
//! also answers mutation-free refresh requests (process start, SIGHUP).

use std::sync::Mutex;

use thiserror::Error;

use crate::trending::display::DisplaySink;
use crate::trending::store::{GameRecord, StoreError, TrendingStore, DEFAULT_PRIORITY};

/// Number of ranked slots mirrored to display artifacts.
pub const TRENDING_SLOTS: usize = 3;

const GAME_ID_MARKER: &str = "cm";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write display artifact for rank {rank}: {source}")]
    Display {
        rank: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Extracts a game id from free-form chat text.
///
/// Scans whitespace-delimited tokens for the `cm` marker, case-insensitively.
/// A token like `cm16` resolves directly; a bare `cm` joins the next token
/// when that token is an integer (`cm 22` -> `CM22`). Ids come back
/// uppercased. Text without a resolvable id yields `None`.
pub fn parse_game_id(chat_message: &str) -> Option<String> {
    let tokens: Vec<&str> = chat_message.split_whitespace().collect();
    for (index, token) in tokens.iter().enumerate() {
        let lowered = token.to_ascii_lowercase();
        let Some(suffix) = lowered.strip_prefix(GAME_ID_MARKER) else {
            continue;
        };
        if suffix.is_empty() {
            // Bare marker: the numeric part may be the next token ("cm 22").
            if let Some(next) = tokens.get(index + 1) {
                if next.parse::<u64>().is_ok() {
                    return Some(format!("CM{}", next));
                }
            }
        } else if suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Some(token.to_ascii_uppercase());
        }
    }
    None
}

pub struct TrendingEngine<S: DisplaySink> {
    store: TrendingStore,
    sink: S,
    clear_stale_ranks: bool,
    // Serializes read-modify-write cycles: the dispatch path and the manual
    // refresh path can run concurrently, and interleaved cycles would drop
    // one side's update.
    write_lock: Mutex<()>,
}

impl<S: DisplaySink> TrendingEngine<S> {
    pub fn new(store: TrendingStore, sink: S, clear_stale_ranks: bool) -> Self {
        Self {
            store,
            sink,
            clear_stale_ranks,
            write_lock: Mutex::new(()),
        }
    }

    /// Applies one cheer to the trending state.
    ///
    /// Returns `Ok(false)` without touching anything when the text carries
    /// no resolvable game id, or an id the store does not know.
    pub fn apply_cheer(&self, chat_message: &str, bits_used: u64) -> Result<bool, EngineError> {
        let Some(game_id) = parse_game_id(chat_message) else {
            log::debug!("No game id in chat message, ignoring cheer");
            return Ok(false);
        };

        let _guard = self.write_lock.lock().expect("trending write lock poisoned");

        let mut db = self.store.read_all()?;
        let Some(record) = db.get_mut(&game_id) else {
            log::info!("Cheer for unknown game id {}, ignoring", game_id);
            return Ok(false);
        };

        record.total_bits += bits_used;
        record.priority -= 1;
        let new_total = record.total_bits;
        let new_priority = record.priority;

        // Tie-reset: siblings already sitting at the mover's new total lose
        // their aged priority, so the most recent arrival wins the tie.
        for game in &mut db.games {
            if game.id != game_id && game.total_bits == new_total {
                game.priority = DEFAULT_PRIORITY;
            }
        }

        self.store.replace(&db)?;
        log::info!(
            "{} now at {} bits (priority {})",
            game_id,
            new_total,
            new_priority
        );

        let top = self.recompute()?;
        self.publish_snapshot(&top)?;
        Ok(true)
    }

    /// Derives the current top ranking from the store. Mutation-free.
    pub fn recompute(&self) -> Result<Vec<GameRecord>, EngineError> {
        let db = self.store.read_all()?;
        let mut games: Vec<GameRecord> = db
            .games
            .into_iter()
            .filter(|game| game.total_bits > 0)
            .collect();
        games.sort_by(|a, b| {
            b.total_bits
                .cmp(&a.total_bits)
                .then(a.priority.cmp(&b.priority))
        });
        games.truncate(TRENDING_SLOTS);
        Ok(games)
    }

    /// Re-derives and republishes the ranking without an event: used for
    /// startup reconciliation and manual refresh requests.
    pub fn refresh(&self) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock().expect("trending write lock poisoned");
        let top = self.recompute()?;
        self.publish_snapshot(&top)
    }

    /// Mirrors the ranking to the display sink, rank 1 first.
    pub fn publish_snapshot(&self, top: &[GameRecord]) -> Result<(), EngineError> {
        for (index, game) in top.iter().enumerate() {
            let rank = index + 1;
            let line = format!("{} : {} bits", game.game_name, game.total_bits);
            self.sink
                .publish(rank, &line)
                .map_err(|source| EngineError::Display { rank, source })?;
        }
        if self.clear_stale_ranks {
            for rank in top.len() + 1..=TRENDING_SLOTS {
                self.sink
                    .clear(rank)
                    .map_err(|source| EngineError::Display { rank, source })?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "pubsub")]
impl<S: DisplaySink> crate::pubsub::session::CheerHandler for TrendingEngine<S> {
    fn on_cheer(&self, chat_message: &str, bits_used: u64) -> anyhow::Result<bool> {
        Ok(self.apply_cheer(chat_message, bits_used)?)
    }
}
