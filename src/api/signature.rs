//! Client identification sent with every request.

use std::fmt;

/// Identifies this client to the server, rendered as the User-Agent:
/// `{app_name}/{version} (build {build}; {platform} {os_version})`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSignature {
    pub app_name: String,
    pub version: String,
    pub build: String,
    pub platform: String,
    pub os_version: String,
}

impl ClientSignature {
    pub fn user_agent(&self) -> String {
        self.to_string()
    }
}

impl Default for ClientSignature {
    fn default() -> Self {
        Self {
            app_name: "ntfy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            build: "1".to_string(),
            platform: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
        }
    }
}

impl fmt::Display for ClientSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} (build {}; {} {})",
            self.app_name, self.version, self.build, self.platform, self.os_version
        )
    }
}
