//! # Trending Engine Walk-through
//!
//! Exercises the full cheer pipeline against a throwaway store and prints
//! the resulting ranking, for eyeballing the engine without a live
//! connection.

use std::fs;

use lib_common::trending::display::FileDisplaySink;
use lib_common::trending::engine::TrendingEngine;
use lib_common::trending::store::{GameDb, GameRecord, TrendingStore};

fn game(id: &str, name: &str, total_bits: u64) -> GameRecord {
    GameRecord {
        id: id.to_string(),
        game_name: name.to_string(),
        total_bits,
        priority: 10,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dir = tempfile::tempdir()?;
    let store = TrendingStore::new(dir.path().join("consolemini.json"));
    store.replace(&GameDb {
        games: vec![
            game("CM10", "Maui Mallard", 1400),
            game("CM16", "Kid Chameleon", 1480),
            game("CM8", "Pete Sampras", 1400),
        ],
    })?;

    let engine = TrendingEngine::new(store, FileDisplaySink::new(dir.path()), false);

    println!("[*] Applying sample cheer: 120 bits for CM16...");
    let applied = engine.apply_cheer(
        "Omg that baneling bust was Kreygasm CM16 cheer10 cheer10 cheer100",
        120,
    )?;
    if !applied {
        eprintln!("[ERROR] Sample cheer was not applied");
        std::process::exit(1);
    }

    println!("\n[SUCCESS] Current top ranking:");
    println!("-----------------------------------------------");
    for (index, ranked) in engine.recompute()?.iter().enumerate() {
        let rank = index + 1;
        let line = fs::read_to_string(dir.path().join(format!("consolemini.{}.txt", rank)))?;
        println!("{}. {}  [{} priority {}]", rank, line, ranked.id, ranked.priority);
    }
    println!("-----------------------------------------------");

    Ok(())
}
