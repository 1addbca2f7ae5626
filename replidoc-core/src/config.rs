//! Immutable client configuration, validated once at construction.
//!
//! The configuration surface recognizes a fixed set of string options
//! (`hosts`, `port`, `username`, `password`, `authDatabase`, `minPoolSize`,
//! `maxPoolSize`, `maxIdleTimeSeconds`, `maxLifetimeMinutes`,
//! `connectTimeoutSeconds`, `readTimeoutSeconds`, `readPreference`); unknown
//! keys are rejected. Nothing in a [`ClientConfig`] mutates after creation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::topology::Topology;

const DEFAULT_PORT: u16 = 27017;

/// Authentication identity attached to every new physical connection at
/// handshake time. Never attached to an in-flight query.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Name of the authenticating user.
    pub username: String,
    /// Database the user authenticates against.
    pub auth_database: String,
    /// The user's secret.
    pub secret: String,
}

impl Credential {
    pub fn new(
        username: impl Into<String>,
        auth_database: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            auth_database: auth_database.into(),
            secret: secret.into(),
        }
    }
}

// The secret never appears in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("auth_database", &self.auth_database)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Size and lifetime limits for the per-node connection pool.
///
/// `max_lifetime` caps total connection age regardless of activity; there is
/// no forced ordering between `max_lifetime` and `max_idle_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections per node the pool will not shrink below purely due to
    /// idleness.
    pub min_size: usize,
    /// Upper bound on live connections per node.
    pub max_size: usize,
    /// Idle connections older than this are evicted (down to `min_size`).
    pub max_idle_time: Duration,
    /// Connections older than this are destroyed on release or sweep, idle
    /// or not.
    pub max_lifetime: Duration,
}

impl PoolConfig {
    pub fn validate(&self) -> ClientResult<()> {
        if self.min_size == 0 {
            return Err(ClientError::Configuration(
                "minPoolSize must be at least 1, a zero-size pool is never usable".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(ClientError::Configuration(format!(
                "minPoolSize ({}) must not exceed maxPoolSize ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 16,
            max_idle_time: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(10 * 60),
        }
    }
}

/// Connect and read deadlines applied to connection establishment and
/// in-flight operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for acquiring a pooled connection, including TCP establish
    /// and credential handshake.
    pub connect: Duration,
    /// Deadline for a single wire round trip.
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(10),
        }
    }
}

/// Policy determining which replica-set role a read operation is routed to.
///
/// Writes always go to the primary; this preference applies to reads only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    /// Only the primary; fails when no primary is known.
    #[default]
    Primary,
    /// The primary when known, otherwise any secondary.
    PrimaryPreferred,
    /// Only a secondary; fails when none is reachable.
    Secondary,
    /// A secondary when reachable, otherwise the primary.
    SecondaryPreferred,
    /// Any reachable node, selected deterministically by topology order.
    Nearest,
}

impl FromStr for ReadPreference {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ReadPreference::Primary),
            "primaryPreferred" => Ok(ReadPreference::PrimaryPreferred),
            "secondary" => Ok(ReadPreference::Secondary),
            "secondaryPreferred" => Ok(ReadPreference::SecondaryPreferred),
            "nearest" => Ok(ReadPreference::Nearest),
            other => Err(ClientError::Configuration(format!(
                "unrecognized readPreference '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        })
    }
}

/// Complete, validated client configuration. Constructed once at startup and
/// immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Seed list of candidate nodes.
    pub topology: Topology,
    /// Optional authentication identity for the connection handshake.
    pub credential: Option<Credential>,
    /// Per-node pool limits.
    pub pool: PoolConfig,
    /// Connect and read deadlines.
    pub timeouts: Timeouts,
    /// Routing policy for reads.
    pub read_preference: ReadPreference,
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the topology
    /// and validates it.
    pub fn new(topology: Topology) -> ClientResult<Self> {
        let config = Self {
            topology,
            credential: None,
            pool: PoolConfig::default(),
            timeouts: Timeouts::default(),
            read_preference: ReadPreference::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from the recognized string option surface.
    ///
    /// Unknown keys and malformed values are `Configuration` errors; the
    /// result is validated before being returned.
    pub fn from_options(options: &HashMap<String, String>) -> ClientResult<Self> {
        let port = match options.get("port") {
            Some(raw) => parse_number::<u16>("port", raw)?,
            None => DEFAULT_PORT,
        };
        let hosts = options
            .get("hosts")
            .ok_or_else(|| ClientError::Configuration("missing required option 'hosts'".into()))?;

        let mut config = Self::new(Topology::from_hosts(hosts, port)?)?;

        for (key, value) in options {
            match key.as_str() {
                "hosts" | "port" | "username" | "password" | "authDatabase" => {}
                "minPoolSize" => config.pool.min_size = parse_number("minPoolSize", value)?,
                "maxPoolSize" => config.pool.max_size = parse_number("maxPoolSize", value)?,
                "maxIdleTimeSeconds" => {
                    config.pool.max_idle_time =
                        Duration::from_secs(parse_number("maxIdleTimeSeconds", value)?);
                }
                "maxLifetimeMinutes" => {
                    config.pool.max_lifetime =
                        Duration::from_secs(parse_number::<u64>("maxLifetimeMinutes", value)? * 60);
                }
                "connectTimeoutSeconds" => {
                    config.timeouts.connect =
                        Duration::from_secs(parse_number("connectTimeoutSeconds", value)?);
                }
                "readTimeoutSeconds" => {
                    config.timeouts.read =
                        Duration::from_secs(parse_number("readTimeoutSeconds", value)?);
                }
                "readPreference" => config.read_preference = value.parse()?,
                other => {
                    return Err(ClientError::Configuration(format!(
                        "unrecognized option '{other}'"
                    )));
                }
            }
        }

        if let Some(username) = options.get("username") {
            let password = options
                .get("password")
                .ok_or_else(|| ClientError::Configuration("username given without password".into()))?;
            let auth_database = options
                .get("authDatabase")
                .ok_or_else(|| ClientError::Configuration("username given without authDatabase".into()))?;
            config.credential = Some(Credential::new(username, auth_database, password));
        } else if options.contains_key("password") || options.contains_key("authDatabase") {
            return Err(ClientError::Configuration(
                "password/authDatabase given without username".into(),
            ));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.topology.is_empty() {
            return Err(ClientError::Configuration("topology has no nodes".into()));
        }
        self.pool.validate()
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> ClientResult<Self> {
        pool.validate()?;
        self.pool = pool;
        Ok(self)
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = preference;
        self
    }
}

fn parse_number<N: FromStr>(key: &str, raw: &str) -> ClientResult<N> {
    raw.parse()
        .map_err(|_| ClientError::Configuration(format!("invalid value '{raw}' for option '{key}'")))
}
