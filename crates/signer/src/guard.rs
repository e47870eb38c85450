use std::{fs, path::PathBuf};

use protocol::Height;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("height {requested} is not above the immutable height {watermark}")]
    HeightRegression { requested: Height, watermark: Height },

    #[error("persist watermark state error: {0}")]
    Persist(#[from] std::io::Error),

    #[error("parse watermark state error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GuardState {
    immutable_height: Option<Height>,
}

/// The remote signer's height watermark. Everything at or below it is final
/// and must never be signed again, across restarts of either process, so an
/// advance hits disk before it is acknowledged.
pub struct HeightGuard {
    state_file: Option<PathBuf>,
    state: GuardState,
}

impl HeightGuard {
    /// Watermark without persistence, for tests and throwaway setups.
    pub fn in_memory() -> Self {
        Self {
            state_file: None,
            state: GuardState::default(),
        }
    }

    pub fn load(state_file: PathBuf) -> Result<Self, GuardError> {
        let state = if state_file.exists() {
            log::info!("[HeightGuard] loading watermark state from {state_file:?}");
            serde_json::from_str(&fs::read_to_string(&state_file)?)?
        } else {
            log::info!("[HeightGuard] starting empty watermark state at {state_file:?}");
            GuardState::default()
        };
        Ok(Self {
            state_file: Some(state_file),
            state,
        })
    }

    pub fn immutable_height(&self) -> Option<Height> {
        self.state.immutable_height
    }

    /// Refuse signing at or below the watermark.
    pub fn check(&self, requested: Height) -> Result<(), GuardError> {
        match self.state.immutable_height {
            Some(watermark) if requested <= watermark => Err(GuardError::HeightRegression { requested, watermark }),
            _ => Ok(()),
        }
    }

    /// Raise the watermark to `height`. The watermark never moves backwards,
    /// lower values are ignored.
    pub fn advance(&mut self, height: Height) -> Result<(), GuardError> {
        if self.state.immutable_height.map_or(false, |watermark| watermark >= height) {
            return Ok(());
        }
        self.state.immutable_height = Some(height);
        self.persist()
    }

    fn persist(&self) -> Result<(), GuardError> {
        let state_file = match &self.state_file {
            Some(state_file) => state_file,
            None => return Ok(()),
        };
        if let Some(parent) = state_file.parent() {
            fs::create_dir_all(parent)?;
        }
        // temp file plus rename keeps a readable state at every moment
        let tmp_file = state_file.with_extension("tmp");
        fs::write(&tmp_file, serde_json::to_vec_pretty(&self.state)?)?;
        let file = fs::File::open(&tmp_file)?;
        file.sync_all()?;
        fs::rename(&tmp_file, state_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn empty_guard_allows_any_height() {
        let guard = HeightGuard::in_memory();
        assert!(guard.check(1.into()).is_ok());
        assert!(guard.check(1_000_000.into()).is_ok());
    }

    #[test]
    fn rejects_at_and_below_watermark() {
        let mut guard = HeightGuard::in_memory();
        guard.advance(10.into()).unwrap();

        assert!(matches!(guard.check(10.into()), Err(GuardError::HeightRegression { .. })));
        assert!(matches!(guard.check(3.into()), Err(GuardError::HeightRegression { .. })));
        assert!(guard.check(11.into()).is_ok());
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let mut guard = HeightGuard::in_memory();
        guard.advance(10.into()).unwrap();
        guard.advance(4.into()).unwrap();

        assert_eq!(guard.immutable_height(), Some(10.into()));
        assert!(guard.check(8.into()).is_err());
    }

    #[test]
    fn watermark_survives_reload() {
        let dir = TempDir::new().unwrap();
        let state_file = dir.path().join("watermark.json");

        {
            let mut guard = HeightGuard::load(state_file.clone()).unwrap();
            assert_eq!(guard.immutable_height(), None);
            guard.advance(42.into()).unwrap();
        }

        let guard = HeightGuard::load(state_file).unwrap();
        assert_eq!(guard.immutable_height(), Some(42.into()));
        assert!(guard.check(42.into()).is_err());
        assert!(guard.check(43.into()).is_ok());
    }
}
