//! networkd bus subscription
//!
//! Subscribes to `PropertiesChanged` signals for
//! `org.freedesktop.network1.Link` objects on the system bus and turns
//! them into raw indexed events for the dispatcher. No polling happens
//! here; networkd pushes every state change.

use crate::error::{LinkhookError, LinkhookResult};
use crate::state::{AdminState, OperState};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, warn};
use zbus::{Connection, MatchRule, MessageStream};
use zvariant::OwnedValue;

const LINK_PATH_PREFIX: &str = "/org/freedesktop/network1/link/";
const LINK_INTERFACE: &str = "org.freedesktop.network1.Link";

/// A state-change notification as it arrives from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLinkEvent {
    /// Link index decoded from the object path
    pub index: u32,
    pub administrative_state: Option<AdminState>,
    pub operational_state: Option<OperState>,
}

/// Decode a network1 link object path into its link index.
///
/// systemd encodes the index as a bus label: any byte outside
/// `[A-Za-z0-9]` (and a leading digit) becomes `_` followed by two hex
/// digits, so index 3 appears as `.../link/_33`. Treated as an opaque
/// contract: raw path in, index out.
pub fn decode_link_index(path: &str) -> Option<u32> {
    let label = path.strip_prefix(LINK_PATH_PREFIX)?;
    if label.is_empty() || label.contains('/') {
        return None;
    }

    let bytes = label.as_bytes();
    let mut decoded = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = label.get(i + 1..i + 3)?;
            let byte = u8::from_str_radix(hex, 16).ok()?;
            decoded.push(byte as char);
            i += 3;
        } else {
            decoded.push(bytes[i] as char);
            i += 1;
        }
    }

    decoded.parse().ok()
}

/// Serial stream of link state changes from the system bus
pub struct LinkStateStream {
    stream: MessageStream,
}

impl LinkStateStream {
    /// Connect to the system bus and install the signal match
    pub async fn connect() -> LinkhookResult<Self> {
        let connection = Connection::system().await?;
        Self::subscribe(&connection).await
    }

    pub async fn subscribe(connection: &Connection) -> LinkhookResult<Self> {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface("org.freedesktop.DBus.Properties")?
            .member("PropertiesChanged")?
            .path_namespace("/org/freedesktop/network1/link")?
            .build();

        let stream = MessageStream::for_match_rule(rule, connection, None).await?;
        Ok(Self { stream })
    }

    /// Wait for the next decodable link event. Returns `None` when the
    /// bus connection is gone.
    pub async fn next_event(&mut self) -> Option<RawLinkEvent> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping undecodable bus message: {}", e);
                    continue;
                }
            };

            let header = message.header();
            let Some(path) = header.path() else {
                continue;
            };
            let Some(index) = decode_link_index(path.as_str()) else {
                debug!("Ignoring signal for non-link path {}", path);
                continue;
            };

            let body: (String, HashMap<String, OwnedValue>, Vec<String>) =
                match message.body().deserialize() {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Dropping malformed PropertiesChanged signal: {}", e);
                        continue;
                    }
                };
            let (interface, changed, _invalidated) = body;
            if interface != LINK_INTERFACE {
                continue;
            }

            return Some(RawLinkEvent {
                index,
                administrative_state: state_property(&changed, "AdministrativeState"),
                operational_state: state_property(&changed, "OperationalState"),
            });
        }
    }
}

fn state_property<T>(changed: &HashMap<String, OwnedValue>, key: &str) -> Option<T>
where
    T: std::str::FromStr<Err = LinkhookError>,
{
    let value = changed.get(key)?;
    let Ok(s) = value.downcast_ref::<zvariant::Str<'_>>() else {
        warn!("Property {} is not a string", key);
        return None;
    };
    match s.as_str().parse() {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Ignoring {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_link_index() {
        assert_eq!(decode_link_index("/org/freedesktop/network1/link/_33"), Some(3));
        assert_eq!(decode_link_index("/org/freedesktop/network1/link/_334"), Some(34));
        assert_eq!(
            decode_link_index("/org/freedesktop/network1/link/_31_32_33"),
            Some(123)
        );
    }

    #[test]
    fn test_decode_rejects_foreign_paths() {
        assert_eq!(decode_link_index("/org/freedesktop/network1"), None);
        assert_eq!(decode_link_index("/org/freedesktop/network1/link/"), None);
        assert_eq!(decode_link_index("/org/freedesktop/network1/link/_33/sub"), None);
        assert_eq!(decode_link_index("/org/freedesktop/resolve1/link/_33"), None);
    }

    #[test]
    fn test_decode_rejects_non_numeric_labels() {
        assert_eq!(decode_link_index("/org/freedesktop/network1/link/eth0"), None);
        assert_eq!(decode_link_index("/org/freedesktop/network1/link/_3"), None);
        assert_eq!(decode_link_index("/org/freedesktop/network1/link/_zz"), None);
    }
}
