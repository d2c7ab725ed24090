/// On-disk checkpoint persistence, grounded in the upstream
/// `CheckpointManager` (load-or-default plus a write-back throttled to once
/// every `flush_interval`, not on every tick — spec.md §4.1 / §7).
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::sync::Mutex;

use crate::models::Cursor;

pub struct CursorStore {
    path: PathBuf,
    flush_interval: Duration,
    state: Mutex<CursorState>,
}

struct CursorState {
    cursor: Cursor,
    last_flushed_at: Option<Instant>,
}

impl CursorStore {
    /// Load the checkpoint file if present; an absent or unparseable file
    /// just means "start from the beginning", matching the upstream
    /// `load()`'s swallow-and-log-default behavior.
    pub async fn load(path: impl Into<PathBuf>, flush_interval: Duration) -> Self {
        let path = path.into();
        let cursor = match fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                tracing::warn!(error = %err, path = %path.display(), "could not parse checkpoint file, starting from the beginning");
                Cursor::none()
            }),
            Err(_) => Cursor::none(),
        };

        Self {
            path,
            flush_interval,
            state: Mutex::new(CursorState {
                cursor,
                last_flushed_at: None,
            }),
        }
    }

    pub async fn current(&self) -> Cursor {
        self.state.lock().await.cursor.clone()
    }

    /// Record the new cursor in memory and flush to disk only if
    /// `flush_interval` has elapsed since the last flush, or if this is the
    /// very first update. Always flushing on shutdown is the caller's job
    /// (see [`Self::flush_now`]).
    pub async fn advance(&self, next: Cursor) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.cursor = next;

        let should_flush = match state.last_flushed_at {
            None => true,
            Some(last) => last.elapsed() >= self.flush_interval,
        };

        if should_flush {
            self.write(&state.cursor).await?;
            state.last_flushed_at = Some(Instant::now());
        }

        Ok(())
    }

    /// Unconditionally persist the current cursor, regardless of the flush
    /// interval. Used on graceful shutdown so a tick's progress is never
    /// silently lost.
    pub async fn flush_now(&self) -> anyhow::Result<()> {
        let state = self.state.lock().await;
        self.write(&state.cursor).await
    }

    async fn write(&self, cursor: &Cursor) -> anyhow::Result<()> {
        let json = serde_json::to_string(cursor)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.ok();
            }
        }
        fs::write(&self.path, json).await?;
        Ok(())
    }
}
