//! Status enrichment
//!
//! Gathers ancillary descriptive data for an interface before a hook
//! run: the `networkctl status` field dump, the wireless network name,
//! and the address list partitioned into usable IPv4/IPv6 subsets.
//! Every field is acquired independently; one failure never blocks the
//! rest of the environment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::process::Command;
use tracing::{debug, error};

/// Everything we could learn about an interface for one hook run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentData {
    /// Raw addresses as reported (may carry prefix lengths)
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Wireless network name, if the link is associated
    #[serde(default)]
    pub essid: Option<String>,
    /// Full `networkctl status` field dump, key to value lines
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
}

/// Source of enrichment data for the hook environment
#[async_trait]
pub trait StatusEnricher: Send + Sync {
    /// Gather what can be gathered for `iface`. Infallible by contract:
    /// unavailable fields are logged and left empty.
    async fn enrich(&self, iface: &str) -> EnrichmentData;
}

/// `networkctl status` + `iw` backed enricher
pub struct NetworkctlEnricher;

#[async_trait]
impl StatusEnricher for NetworkctlEnricher {
    async fn enrich(&self, iface: &str) -> EnrichmentData {
        let mut data = EnrichmentData::default();

        match query_status(iface).await {
            Ok(fields) => {
                data.addresses = fields
                    .get("Address")
                    .map(|lines| lines.iter().filter_map(|l| first_token(l)).collect())
                    .unwrap_or_default();
                data.fields = fields;
            }
            Err(e) => error!("Failed to query status of {}: {}", iface, e),
        }

        match query_essid(iface).await {
            Ok(essid) => data.essid = essid,
            Err(e) => error!("Failed to query wireless name of {}: {}", iface, e),
        }

        data
    }
}

async fn query_status(iface: &str) -> std::io::Result<BTreeMap<String, Vec<String>>> {
    let output = Command::new("networkctl")
        .args(["status", "--no-pager", "--no-legend", "--", iface])
        .output()
        .await?;

    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "networkctl status exited with {:?}",
            output.status.code()
        )));
    }

    Ok(parse_status(&String::from_utf8_lossy(&output.stdout)))
}

async fn query_essid(iface: &str) -> std::io::Result<Option<String>> {
    let output = Command::new("iw")
        .args(["dev", iface, "link"])
        .output()
        .await?;

    // iw exits non-zero for non-wireless links; that is an absent
    // field, not a failure.
    if !output.status.success() {
        debug!("No wireless name for {} (iw exited non-zero)", iface);
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_essid(&stdout))
}

/// Parse `networkctl status` output into key -> value lines.
///
/// Lines look like `    Address: 192.168.1.5`; indented lines without
/// a key continue the previous one (additional addresses, DNS servers).
pub fn parse_status(stdout: &str) -> BTreeMap<String, Vec<String>> {
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((key, value)) = trimmed.split_once(": ") {
            let key = key.trim().to_string();
            fields
                .entry(key.clone())
                .or_default()
                .push(value.trim().to_string());
            current = Some(key);
        } else if let Some(key) = &current {
            // Continuation line for the previous key
            if let Some(values) = fields.get_mut(key) {
                values.push(trimmed.to_string());
            }
        }
    }

    fields
}

/// Extract the SSID from `iw dev <iface> link` output
pub fn parse_essid(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("SSID: "))
        .map(|ssid| ssid.trim().to_string())
        .filter(|ssid| !ssid.is_empty())
}

fn first_token(line: &str) -> Option<String> {
    line.split_whitespace().next().map(|t| t.to_string())
}

fn is_link_local_v6(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Split raw addresses into usable IPv4 and IPv6 subsets.
///
/// Loopback and link-local addresses are dropped from both; entries
/// that do not parse as addresses are dropped silently (the raw list
/// is still available through the `json` snapshot).
pub fn partition_addresses(addresses: &[String]) -> (Vec<Ipv4Addr>, Vec<Ipv6Addr>) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();

    for raw in addresses {
        // networkctl may report prefix lengths
        let bare = raw.split('/').next().unwrap_or(raw);
        match bare.parse::<IpAddr>() {
            Ok(IpAddr::V4(addr)) => {
                if !addr.is_loopback() && !addr.is_link_local() {
                    v4.push(addr);
                }
            }
            Ok(IpAddr::V6(addr)) => {
                if !addr.is_loopback() && !is_link_local_v6(&addr) {
                    v6.push(addr);
                }
            }
            Err(_) => debug!("Skipping unparseable address '{}'", raw),
        }
    }

    (v4, v6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_addresses() {
        let input: Vec<String> = ["127.0.0.1", "192.168.1.5", "fe80::1", "2001:db8::1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let (v4, v6) = partition_addresses(&input);
        assert_eq!(v4, vec!["192.168.1.5".parse::<Ipv4Addr>().unwrap()]);
        assert_eq!(v6, vec!["2001:db8::1".parse::<Ipv6Addr>().unwrap()]);
    }

    #[test]
    fn test_partition_excludes_v4_link_local_and_prefixes() {
        let input: Vec<String> = ["169.254.10.1", "10.0.0.2/24", "::1", "garbage"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let (v4, v6) = partition_addresses(&input);
        assert_eq!(v4, vec!["10.0.0.2".parse::<Ipv4Addr>().unwrap()]);
        assert!(v6.is_empty());
    }

    #[test]
    fn test_parse_status() {
        let stdout = "\
● 2: eth0
       Link File: /usr/lib/systemd/network/99-default.link
    Network File: /etc/systemd/network/20-wired.network
            Type: ether
           State: routable (configured)
         Address: 192.168.1.5
                  fe80::1
             DNS: 192.168.1.1
";
        let fields = parse_status(stdout);
        assert_eq!(
            fields.get("Address").unwrap(),
            &vec!["192.168.1.5".to_string(), "fe80::1".to_string()]
        );
        assert_eq!(fields.get("Type").unwrap(), &vec!["ether".to_string()]);
        assert_eq!(fields.get("DNS").unwrap(), &vec!["192.168.1.1".to_string()]);
    }

    #[test]
    fn test_parse_essid() {
        let stdout = "\
Connected to aa:bb:cc:dd:ee:ff (on wlan0)
	SSID: home-net
	freq: 5180
";
        assert_eq!(parse_essid(stdout), Some("home-net".to_string()));
        assert_eq!(parse_essid("Not connected.\n"), None);
    }
}
