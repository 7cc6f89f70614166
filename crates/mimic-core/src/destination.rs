//! Transfer destinations and the host keys derived from them.
//!
//! A [`Destination`] is passed to rsync verbatim. The daemon only looks inside
//! it to decide whether the target is reached over ssh and, if so, which
//! [`HostKey`] a pooled connection should be keyed on.
//!
//! The remote/local decision follows rsync's own rule: a destination is remote
//! when it contains a `:` and the text before the first `:` has no `/`.
//! rsync daemon targets (`host::module`, `rsync://...`) do not use ssh and
//! therefore have no host key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DestinationError;

/// Port embedded in control socket names.
const SSH_PORT: u16 = 22;

/// User name used in control socket names when the destination names none
/// and `$USER` is unset.
const FALLBACK_USER: &str = "default";

/// An rsync-style transfer target such as `alice@build:/srv/www` or `/mnt/backup`.
///
/// # Examples
///
/// ```
/// use mimic_core::Destination;
///
/// let dest: Destination = "alice@build:/srv/www".parse().unwrap();
/// assert!(dest.is_remote());
/// assert_eq!(dest.host_key().unwrap().to_string(), "alice@build");
///
/// let local: Destination = "/mnt/backup".parse().unwrap();
/// assert!(local.host_key().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Destination(String);

impl Destination {
    /// Parses and validates a destination.
    ///
    /// # Errors
    ///
    /// Returns [`DestinationError::Empty`] for an empty string and
    /// [`DestinationError::EmptyHost`] for `user@:path`.
    pub fn new(raw: impl Into<String>) -> Result<Self, DestinationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DestinationError::Empty);
        }
        if let Some(prefix) = remote_prefix(&raw) {
            let host = prefix.rsplit_once('@').map_or(prefix, |(_, host)| host);
            if host.is_empty() {
                return Err(DestinationError::EmptyHost(raw));
            }
        }
        Ok(Self(raw))
    }

    /// Returns the destination as passed to rsync.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if rsync reaches this destination over ssh.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.host_key().is_some()
    }

    /// Returns the host a pooled connection for this destination is keyed on.
    ///
    /// `None` for local paths and rsync daemon targets.
    #[must_use]
    pub fn host_key(&self) -> Option<HostKey> {
        let prefix = remote_prefix(&self.0)?;
        let key = match prefix.rsplit_once('@') {
            Some((user, host)) if !user.is_empty() => HostKey::new(Some(user), host),
            Some((_, host)) => HostKey::new(None, host),
            None => HostKey::new(None, prefix),
        };
        Some(key)
    }
}

/// Returns the `[user@]host` part of an ssh destination, if it is one.
fn remote_prefix(raw: &str) -> Option<&str> {
    if raw.starts_with("rsync://") {
        return None;
    }
    let (prefix, rest) = raw.split_once(':')?;
    if prefix.is_empty() || prefix.contains('/') || rest.starts_with(':') {
        return None;
    }
    Some(prefix)
}

impl FromStr for Destination {
    type Err = DestinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Destination {
    type Error = DestinationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        value.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a remote host for connection pooling: optional user plus host.
///
/// Two watches share a pooled connection exactly when their host keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostKey {
    /// Login user, if the destination named one.
    pub user: Option<String>,
    /// Host name or address.
    pub host: String,
}

impl HostKey {
    /// Creates a host key.
    #[must_use]
    pub fn new(user: Option<&str>, host: &str) -> Self {
        Self {
            user: user.map(ToOwned::to_owned),
            host: host.to_owned(),
        }
    }

    /// Returns the ssh target (`user@host` or `host`).
    #[must_use]
    pub fn ssh_target(&self) -> String {
        self.to_string()
    }

    /// Returns the file name of the ssh control socket for this host.
    ///
    /// Format: `mimic_<host>_<port>_<user>`. When the destination names no
    /// user, the current login (`$USER`) is used so the name stays stable.
    #[must_use]
    pub fn control_file_name(&self) -> String {
        let user = self.user.clone().unwrap_or_else(|| {
            std::env::var("USER")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| FALLBACK_USER.to_owned())
        });
        format!("mimic_{}_{SSH_PORT}_{user}", self.host)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{user}@{}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(raw: &str) -> Destination {
        Destination::new(raw).unwrap()
    }

    #[test]
    fn test_remote_with_user() {
        let key = dest("alice@build.local:/srv/www").host_key().unwrap();
        assert_eq!(key.user.as_deref(), Some("alice"));
        assert_eq!(key.host, "build.local");
        assert_eq!(key.ssh_target(), "alice@build.local");
    }

    #[test]
    fn test_remote_without_user() {
        let key = dest("build:backups").host_key().unwrap();
        assert_eq!(key.user, None);
        assert_eq!(key.host, "build");
    }

    #[test]
    fn test_local_paths_have_no_host() {
        assert!(dest("/mnt/backup").host_key().is_none());
        assert!(dest("relative/dir").host_key().is_none());
        // A colon after a slash is part of a local file name
        assert!(dest("./odd:name").host_key().is_none());
    }

    #[test]
    fn test_rsync_daemon_targets_have_no_host() {
        assert!(dest("mirror::module/path").host_key().is_none());
        assert!(dest("rsync://mirror/module").host_key().is_none());
    }

    #[test]
    fn test_same_user_and_host_share_key() {
        let a = dest("bob@host:/a").host_key();
        let b = dest("bob@host:/b").host_key();
        let c = dest("carol@host:/a").host_key();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_destination_rejected() {
        assert_eq!(Destination::new(""), Err(DestinationError::Empty));
        assert_eq!(Destination::new("   "), Err(DestinationError::Empty));
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(matches!(
            Destination::new("bob@:/srv"),
            Err(DestinationError::EmptyHost(_))
        ));
    }

    #[test]
    fn test_control_file_name_with_user() {
        let key = HostKey::new(Some("bob"), "example.org");
        assert_eq!(key.control_file_name(), "mimic_example.org_22_bob");
    }

    #[test]
    fn test_serde_validates() {
        let parsed: Destination = serde_json::from_str(r#""bob@host:/srv""#).unwrap();
        assert_eq!(parsed.as_str(), "bob@host:/srv");
        assert!(serde_json::from_str::<Destination>(r#""""#).is_err());
        assert_eq!(serde_json::to_string(&parsed).unwrap(), r#""bob@host:/srv""#);
    }
}
