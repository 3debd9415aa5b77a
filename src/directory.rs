//! Interface directory
//!
//! Tracks every link networkd knows about: a stable ifindex to name
//! mapping plus the last-seen state snapshot per name. Both views are
//! rebuilt together from one `networkctl list` query and are never
//! partially stale relative to each other.

use crate::error::{LinkhookError, LinkhookResult};
use crate::state::{AdminState, OperState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::process::Command;
use tracing::{debug, warn};

/// Snapshot of one link as last seen by the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRecord {
    /// Stable index assigned by the kernel/networkd
    pub index: u32,
    /// Kernel-visible interface name
    pub name: String,
    /// Last-known administrative state
    pub administrative_state: Option<AdminState>,
    /// Last-known operational state
    pub operational_state: Option<OperState>,
}

impl InterfaceRecord {
    /// Copy with a new administrative state
    pub fn with_administrative(&self, state: AdminState) -> Self {
        Self {
            administrative_state: Some(state),
            ..self.clone()
        }
    }

    /// Copy with a new operational state
    pub fn with_operational(&self, state: OperState) -> Self {
        Self {
            operational_state: Some(state),
            ..self.clone()
        }
    }
}

/// External source of the full link list
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// Query the management service for every known link
    async fn list_links(&self) -> LinkhookResult<Vec<InterfaceRecord>>;
}

/// `networkctl list` backed link source
pub struct NetworkctlLinkSource;

#[async_trait]
impl LinkSource for NetworkctlLinkSource {
    async fn list_links(&self) -> LinkhookResult<Vec<InterfaceRecord>> {
        let output = Command::new("networkctl")
            .args(["list", "--no-pager", "--no-legend"])
            .output()
            .await
            .map_err(|e| {
                LinkhookError::DirectoryUnavailable(format!("failed to run networkctl: {}", e))
            })?;

        if !output.status.success() {
            return Err(LinkhookError::DirectoryUnavailable(format!(
                "networkctl list exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_link_list(&stdout)
    }
}

/// Parse `networkctl list --no-legend` output.
///
/// Columns: IDX LINK TYPE OPERATIONAL SETUP. State columns that do not
/// parse (newer networkd spellings) leave the snapshot field unset so
/// the first real notification is treated as a transition.
fn parse_link_list(stdout: &str) -> LinkhookResult<Vec<InterfaceRecord>> {
    let mut records = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(LinkhookError::DirectoryUnavailable(format!(
                "malformed networkctl list line: '{}'",
                line
            )));
        }

        let index: u32 = fields[0].parse().map_err(|_| {
            LinkhookError::DirectoryUnavailable(format!(
                "malformed link index '{}' in networkctl output",
                fields[0]
            ))
        })?;

        let operational = match fields[3].parse::<OperState>() {
            Ok(s) => Some(s),
            Err(_) => {
                debug!("Unrecognized operational state '{}' for {}", fields[3], fields[1]);
                None
            }
        };
        let administrative = match fields[4].parse::<AdminState>() {
            Ok(s) => Some(s),
            Err(_) => {
                debug!("Unrecognized setup state '{}' for {}", fields[4], fields[1]);
                None
            }
        };

        records.push(InterfaceRecord {
            index,
            name: fields[1].to_string(),
            administrative_state: administrative,
            operational_state: operational,
        });
    }

    Ok(records)
}

/// Two associative views over the same generation of interface records
pub struct InterfaceDirectory {
    source: Box<dyn LinkSource>,
    index_to_name: HashMap<u32, String>,
    records: HashMap<String, InterfaceRecord>,
}

impl InterfaceDirectory {
    pub fn new(source: Box<dyn LinkSource>) -> Self {
        Self {
            source,
            index_to_name: HashMap::new(),
            records: HashMap::new(),
        }
    }

    /// Re-query the link source and atomically replace both views.
    ///
    /// On failure the previous generation is kept untouched.
    pub async fn rebuild(&mut self) -> LinkhookResult<()> {
        let links = self.source.list_links().await?;

        let mut index_to_name = HashMap::with_capacity(links.len());
        let mut records = HashMap::with_capacity(links.len());
        for record in links {
            if let Some(previous) = index_to_name.insert(record.index, record.name.clone()) {
                warn!(
                    "Duplicate link index {} ({} and {}), keeping the latter",
                    record.index, previous, record.name
                );
            }
            records.insert(record.name.clone(), record);
        }

        self.index_to_name = index_to_name;
        self.records = records;
        debug!("Interface directory rebuilt, {} links", self.records.len());
        Ok(())
    }

    /// Resolve a raw link index to an interface name
    pub fn resolve(&self, index: u32) -> Option<&str> {
        self.index_to_name.get(&index).map(String::as_str)
    }

    /// Look up the stored record for an interface name
    pub fn get(&self, name: &str) -> Option<&InterfaceRecord> {
        self.records.get(name)
    }

    /// Replace the stored record for its name, preserving identity
    pub fn put(&mut self, record: InterfaceRecord) {
        self.records.insert(record.name.clone(), record);
    }

    /// Names of all currently known interfaces, for reconciliation
    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
  1 lo     loopback carrier  unmanaged
  2 eth0   ether    routable configured
  3 wlan0  wlan     dormant  configuring
";

    #[test]
    fn test_parse_link_list() {
        let records = parse_link_list(SAMPLE).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].name, "lo");
        assert_eq!(records[0].operational_state, Some(OperState::Carrier));
        assert_eq!(records[0].administrative_state, Some(AdminState::Unmanaged));

        assert_eq!(records[1].name, "eth0");
        assert_eq!(records[1].operational_state, Some(OperState::Routable));
        assert_eq!(records[1].administrative_state, Some(AdminState::Configured));
    }

    #[test]
    fn test_parse_link_list_unknown_states() {
        let records = parse_link_list("  4 dummy0 ether enslaved weird\n").unwrap();
        assert_eq!(records[0].operational_state, None);
        assert_eq!(records[0].administrative_state, None);
    }

    #[test]
    fn test_parse_link_list_malformed() {
        assert!(parse_link_list("not a table\n").is_err());
        assert!(parse_link_list("  x eth0 ether routable configured\n").is_err());
    }

    struct StaticSource(Vec<InterfaceRecord>);

    #[async_trait]
    impl LinkSource for StaticSource {
        async fn list_links(&self) -> LinkhookResult<Vec<InterfaceRecord>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl LinkSource for FailingSource {
        async fn list_links(&self) -> LinkhookResult<Vec<InterfaceRecord>> {
            Err(LinkhookError::DirectoryUnavailable("query failed".into()))
        }
    }

    fn record(index: u32, name: &str) -> InterfaceRecord {
        InterfaceRecord {
            index,
            name: name.to_string(),
            administrative_state: Some(AdminState::Configured),
            operational_state: Some(OperState::Routable),
        }
    }

    #[tokio::test]
    async fn test_rebuild_replaces_both_views() {
        let mut dir = InterfaceDirectory::new(Box::new(StaticSource(vec![
            record(1, "lo"),
            record(2, "eth0"),
        ])));
        dir.rebuild().await.unwrap();

        assert_eq!(dir.resolve(2), Some("eth0"));
        assert_eq!(dir.get("eth0").unwrap().index, 2);
        assert_eq!(dir.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_generation() {
        let mut dir = InterfaceDirectory::new(Box::new(StaticSource(vec![record(2, "eth0")])));
        dir.rebuild().await.unwrap();

        dir.source = Box::new(FailingSource);
        assert!(dir.rebuild().await.is_err());
        assert_eq!(dir.resolve(2), Some("eth0"));
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn test_put_replaces_record() {
        let mut dir = InterfaceDirectory::new(Box::new(StaticSource(vec![record(2, "eth0")])));
        dir.rebuild().await.unwrap();

        let updated = dir.get("eth0").unwrap().with_operational(OperState::NoCarrier);
        dir.put(updated);
        assert_eq!(
            dir.get("eth0").unwrap().operational_state,
            Some(OperState::NoCarrier)
        );
        // Identity untouched
        assert_eq!(dir.get("eth0").unwrap().index, 2);
    }
}
