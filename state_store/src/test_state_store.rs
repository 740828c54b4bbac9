use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use crate::StateStore;

/// A state store in a temporary directory that lives as long as the value.
pub struct TestStateStore {
    pub state: Arc<StateStore>,
    _temp_dir: TempDir,
}

impl TestStateStore {
    pub async fn new() -> Result<TestStateStore> {
        let temp_dir = tempfile::tempdir()?;
        let state = StateStore::new(temp_dir.path().join("state")).await?;
        Ok(TestStateStore {
            state,
            _temp_dir: temp_dir,
        })
    }
}
