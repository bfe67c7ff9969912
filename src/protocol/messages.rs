//! Startup-phase message structures

use std::collections::HashMap;

use super::constants::PROTOCOL_VERSION_3_0;

/// Regular startup message.
///
/// Format: Length (4) + Protocol Version (4) + Parameters (null-terminated pairs) + \0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupMessage {
    /// Protocol version (196608 for v3.0)
    pub protocol_version: u32,
    /// Connection parameters (user, database, options, etc.)
    pub parameters: HashMap<String, String>,
}

impl StartupMessage {
    /// Create a new startup message with the given user.
    pub fn new(user: &str) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("user".to_string(), user.to_string());
        Self {
            protocol_version: PROTOCOL_VERSION_3_0,
            parameters,
        }
    }

    /// Create a startup message with user and database.
    pub fn with_database(user: &str, database: &str) -> Self {
        let mut msg = Self::new(user);
        msg.parameters
            .insert("database".to_string(), database.to_string());
        msg
    }

    /// Get the username from parameters.
    pub fn user(&self) -> Option<&str> {
        self.parameters.get("user").map(|s| s.as_str())
    }

    /// Get the database name from parameters.
    pub fn database(&self) -> Option<&str> {
        self.parameters.get("database").map(|s| s.as_str())
    }
}

/// Query cancellation request.
///
/// Format: Length (4) + Cancel Code (4) + Process ID (4) + Secret Key (4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelRequest {
    /// Backend process ID
    pub process_id: u32,
    /// Backend secret key
    pub secret_key: u32,
}

impl CancelRequest {
    /// Total message length
    pub const LENGTH: u32 = 16;
}
