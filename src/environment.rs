//! Hook environment assembly
//!
//! Builds the fixed set of variables each hook receives. The runner
//! overlays these on the ambient process environment, which is passed
//! through unmodified.

use crate::enrich::{partition_addresses, EnrichmentData};
use crate::state::{AdminState, OperState};
use std::collections::HashMap;
use tracing::error;

/// Build the environment mapping for one hook run.
///
/// `state` is the target state string for this specific run; the two
/// axis variables carry the best-known current values and may be empty.
pub fn build_hook_env(
    iface: &str,
    state: &str,
    administrative_state: Option<AdminState>,
    operational_state: Option<OperState>,
    data: &EnrichmentData,
) -> HashMap<String, String> {
    let (v4, v6) = partition_addresses(&data.addresses);

    let mut env = HashMap::new();
    env.insert("IFACE".to_string(), iface.to_string());
    env.insert("STATE".to_string(), state.to_string());
    env.insert(
        "AdministrativeState".to_string(),
        administrative_state.map(|s| s.as_str().to_string()).unwrap_or_default(),
    );
    env.insert(
        "OperationalState".to_string(),
        operational_state.map(|s| s.as_str().to_string()).unwrap_or_default(),
    );
    env.insert(
        "ADDR".to_string(),
        v4.first().map(|a| a.to_string()).unwrap_or_default(),
    );
    env.insert("IP_ADDRS".to_string(), join_addrs(&v4));
    env.insert("IP6_ADDRS".to_string(), join_addrs(&v6));
    env.insert(
        "ESSID".to_string(),
        data.essid.clone().unwrap_or_default(),
    );

    let json = serde_json::to_string(data).unwrap_or_else(|e| {
        error!("Failed to serialize enrichment snapshot: {}", e);
        "{}".to_string()
    });
    env.insert("json".to_string(), json);

    env
}

fn join_addrs<T: ToString>(addrs: &[T]) -> String {
    addrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> EnrichmentData {
        EnrichmentData {
            addresses: vec![
                "127.0.0.1".to_string(),
                "192.168.1.5".to_string(),
                "10.0.0.7".to_string(),
                "fe80::1".to_string(),
                "2001:db8::1".to_string(),
            ],
            essid: Some("home-net".to_string()),
            fields: Default::default(),
        }
    }

    #[test]
    fn test_fixed_keys_present() {
        let env = build_hook_env(
            "eth0",
            "routable",
            Some(AdminState::Configured),
            Some(OperState::Routable),
            &sample_data(),
        );

        for key in [
            "IFACE",
            "STATE",
            "AdministrativeState",
            "OperationalState",
            "ADDR",
            "IP_ADDRS",
            "IP6_ADDRS",
            "ESSID",
            "json",
        ] {
            assert!(env.contains_key(key), "missing key {}", key);
        }

        assert_eq!(env["IFACE"], "eth0");
        assert_eq!(env["STATE"], "routable");
        assert_eq!(env["AdministrativeState"], "configured");
        assert_eq!(env["OperationalState"], "routable");
    }

    #[test]
    fn test_address_variables() {
        let env = build_hook_env("eth0", "routable", None, None, &sample_data());
        assert_eq!(env["ADDR"], "192.168.1.5");
        assert_eq!(env["IP_ADDRS"], "192.168.1.5 10.0.0.7");
        assert_eq!(env["IP6_ADDRS"], "2001:db8::1");
        assert_eq!(env["ESSID"], "home-net");
    }

    #[test]
    fn test_absent_values_are_empty_strings() {
        let env = build_hook_env("eth0", "off", None, None, &EnrichmentData::default());
        assert_eq!(env["AdministrativeState"], "");
        assert_eq!(env["OperationalState"], "");
        assert_eq!(env["ADDR"], "");
        assert_eq!(env["IP_ADDRS"], "");
        assert_eq!(env["ESSID"], "");

        let parsed: serde_json::Value = serde_json::from_str(&env["json"]).unwrap();
        assert!(parsed.is_object());
    }
}
