//! Plain-text display artifacts for the ranked snapshot.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Where ranked snapshot lines end up. Rank 1 is the most trending game.
pub trait DisplaySink: Send + Sync {
    fn publish(&self, rank: usize, line: &str) -> io::Result<()>;

    /// Removes the artifact for a rank; a rank that was never published is
    /// not an error.
    fn clear(&self, rank: usize) -> io::Result<()>;
}

/// Writes one `consolemini.<rank>.txt` file per rank under a directory.
pub struct FileDisplaySink {
    dir: PathBuf,
}

impl FileDisplaySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn rank_path(&self, rank: usize) -> PathBuf {
        self.dir.join(format!("consolemini.{}.txt", rank))
    }
}

impl DisplaySink for FileDisplaySink {
    fn publish(&self, rank: usize, line: &str) -> io::Result<()> {
        // A single line, no trailing newline: the overlay reads the file as-is.
        fs::write(self.rank_path(rank), line)
    }

    fn clear(&self, rank: usize) -> io::Result<()> {
        match fs::remove_file(self.rank_path(rank)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
