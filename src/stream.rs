// Stream facade for the state stream
//
// A Stream owns the configuration and a shared handle to the storage
// backend. It lazily constructs the single write cursor and dispatches
// writes to it; readers are built on demand and owned by the caller.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::StreamConfig;
use crate::cursor::{Cursor, CursorMode};
use crate::entry::StreamEntry;
use crate::error::{Error, Result};
use crate::state::StateData;
use crate::storage::StorageBackend;
use crate::types::Timestamp;

/// A state stream instance
pub struct Stream {
    config: Mutex<StreamConfig>,
    storage: Arc<dyn StorageBackend>,
    write_cursor: Mutex<Option<Arc<Cursor>>>,
}

impl Stream {
    /// Create a stream over a storage backend
    ///
    /// Uses the default configuration when `config` is `None`; an explicit
    /// config is validated first.
    pub fn new(storage: Arc<dyn StorageBackend>, config: Option<StreamConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(Self {
            config: Mutex::new(config),
            storage,
            write_cursor: Mutex::new(None),
        })
    }

    /// The stream configuration
    pub fn config(&self) -> Result<StreamConfig> {
        Ok(*self.lock_config()?)
    }

    /// The storage backend handle
    pub fn storage(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.storage)
    }

    /// Initialize the stream for writing
    ///
    /// Called automatically by the first write. The write cursor picks up
    /// the current stream tail and the stream's rate config.
    pub fn init_writer(&self) -> Result<()> {
        let mut guard = self.lock_writer()?;
        if guard.is_some() {
            return Ok(());
        }
        let cursor = Arc::new(Cursor::new(Arc::clone(&self.storage), CursorMode::Write));
        cursor.set_rate(self.config()?.record_rate)?;
        cursor.init(Timestamp::now())?;
        if !cursor.ready()? {
            return Err(Error::InvalidState(
                "write cursor not ready after init".to_string(),
            ));
        }
        *guard = Some(cursor);
        Ok(())
    }

    /// The write cursor, initializing it if needed
    pub fn write_cursor(&self) -> Result<Arc<Cursor>> {
        {
            let guard = self.lock_writer()?;
            if let Some(cursor) = guard.as_ref() {
                return Ok(Arc::clone(cursor));
            }
        }
        self.init_writer()?;
        let guard = self.lock_writer()?;
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| Error::InvalidState("write cursor missing after init".to_string()))
    }

    /// Record a new document state at `timestamp`
    pub fn write_state(&self, timestamp: Timestamp, state: StateData) -> Result<()> {
        let cursor = self.write_cursor()?;
        let rate = self.config()?.record_rate;
        cursor.write_state(timestamp, state, &rate)
    }

    /// Record a pre-formed entry
    pub fn write_entry(&self, entry: StreamEntry) -> Result<()> {
        let cursor = self.write_cursor()?;
        let rate = self.config()?.record_rate;
        cursor.write_entry(entry, &rate)
    }

    /// Build a new cursor over this stream's backend
    pub fn build_cursor(&self, mode: CursorMode) -> Cursor {
        Cursor::new(Arc::clone(&self.storage), mode)
    }

    /// Drop the write cursor so the next write re-reads the stream tail
    pub fn reset_writer(&self) -> Result<()> {
        let mut guard = self.lock_writer()?;
        if guard.take().is_some() {
            debug!("write cursor reset");
        }
        Ok(())
    }

    /// Disable mutation amendments for this stream
    ///
    /// Zeroes the change frequency in the stream config and in the live
    /// write cursor's cached rate, so every future change persists as its
    /// own entry.
    pub fn disable_amends(&self) -> Result<()> {
        let rate = {
            let mut config = self.lock_config()?;
            config.record_rate.change_frequency = 0;
            config.record_rate
        };
        let guard = self.lock_writer()?;
        if let Some(cursor) = guard.as_ref() {
            cursor.set_rate(rate)?;
        }
        Ok(())
    }

    fn lock_config(&self) -> Result<std::sync::MutexGuard<'_, StreamConfig>> {
        self.config
            .lock()
            .map_err(|_| Error::Lock("stream config lock poisoned".to_string()))
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Option<Arc<Cursor>>>> {
        self.write_cursor
            .lock()
            .map_err(|_| Error::Lock("stream writer lock poisoned".to_string()))
    }
}
