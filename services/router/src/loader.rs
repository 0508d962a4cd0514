//! Snapshot and refresh file loading
//!
//! Both files are JSON. A snapshot is either a bare array of pools or an
//! object with a `pools` array; a refresh maps pool ids to live balances.

use crate::registry::{LiveBalances, PoolRecord};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Snapshot file layout as written by the indexer
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SnapshotFile {
    Wrapped { pools: Vec<PoolRecord> },
    Bare(Vec<PoolRecord>),
}

impl SnapshotFile {
    pub fn into_pools(self) -> Vec<PoolRecord> {
        match self {
            SnapshotFile::Wrapped { pools } | SnapshotFile::Bare(pools) => pools,
        }
    }
}

/// Load pool records from a snapshot file
pub fn load_snapshot_file(path: &Path) -> Result<Vec<PoolRecord>> {
    info!("Loading pool snapshot from {:?}", path);

    let json_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pool snapshot {}", path.display()))?;

    let snapshot: SnapshotFile =
        serde_json::from_str(&json_content).context("Failed to parse pool snapshot JSON")?;
    let pools = snapshot.into_pools();

    info!("Found {} pools in snapshot", pools.len());
    Ok(pools)
}

/// Load live balances from a refresh file
pub fn load_refresh_file(path: &Path) -> Result<LiveBalances> {
    info!("Loading on-chain refresh from {:?}", path);

    let json_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read refresh file {}", path.display()))?;

    let live: LiveBalances =
        serde_json::from_str(&json_content).context("Failed to parse refresh JSON")?;

    info!("Found live balances for {} pools", live.len());
    Ok(live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SNAPSHOT: &str = r#"{
        "pools": [
            {
                "id": "0xpool",
                "poolType": "Weighted",
                "swapFee": "0.003",
                "tokens": [
                    {"address": "0x1111111111111111111111111111111111111111", "balance": "1000", "decimals": 18, "weight": "0.5"},
                    {"address": "0x2222222222222222222222222222222222222222", "balance": 2000.5, "decimals": 6, "weight": "0.5"}
                ]
            }
        ]
    }"#;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_wrapped_snapshot() {
        let file = write_temp(SNAPSHOT);
        let pools = load_snapshot_file(file.path()).unwrap();

        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].pool_type, "Weighted");
        assert_eq!(pools[0].swap_fee, dec!(0.003));
        assert_eq!(pools[0].amp, None);
        assert_eq!(pools[0].tokens[1].balance, dec!(2000.5));
        assert_eq!(pools[0].tokens[1].decimals, 6);
    }

    #[test]
    fn test_load_bare_snapshot() {
        let bare = r#"[{"id": "s", "poolType": "Stable", "swapFee": "0.0004", "amp": "200", "tokens": []}]"#;
        let file = write_temp(bare);
        let pools = load_snapshot_file(file.path()).unwrap();

        assert_eq!(pools[0].amp, Some(dec!(200)));
        assert!(pools[0].tokens.is_empty());
    }

    #[test]
    fn test_load_refresh() {
        let file = write_temp(r#"{"0xpool": {"balances": ["900", "2100"]}}"#);
        let live = load_refresh_file(file.path()).unwrap();

        assert_eq!(live["0xpool"].balances, vec![dec!(900), dec!(2100)]);
        assert!(live["0xpool"].weights.is_none());
    }

    #[test]
    fn test_missing_and_malformed_files() {
        assert!(load_snapshot_file(Path::new("/nonexistent/snapshot.json")).is_err());

        let file = write_temp("{not json");
        assert!(load_snapshot_file(file.path()).is_err());
        assert!(load_refresh_file(file.path()).is_err());
    }
}
