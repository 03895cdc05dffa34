//! Stored credentials and the signed-in user.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{UntisyncError, UntisyncResult};

/// WebUntis account details, stored next to the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Server host, e.g. `example.webuntis.com`.
    pub server: String,
    pub school: String,
    pub username: String,
    pub password: String,
}

/// The user record resolved after login, cached like any other topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub display_name: String,
}

impl Credentials {
    pub fn path() -> UntisyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| UntisyncError::Config("Could not determine config directory".into()))?
            .join("untisync");

        Ok(config_dir.join("credentials.toml"))
    }

    /// Load stored credentials; absence means the user never authenticated.
    pub fn load() -> UntisyncResult<Credentials> {
        let path = Self::path()?;
        if !path.exists() {
            return Err(UntisyncError::NotAuthenticated);
        }

        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| UntisyncError::Config(e.to_string()))
    }

    pub fn save(&self) -> UntisyncResult<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| UntisyncError::Config(e.to_string()))?;
        fs::write(&path, content)?;

        // The file holds a plaintext password; keep it private.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_roundtrip_through_toml() {
        let credentials = Credentials {
            server: "example.webuntis.com".into(),
            school: "testschool".into(),
            username: "jane".into(),
            password: "secret".into(),
        };

        let content = toml::to_string_pretty(&credentials).unwrap();
        let parsed: Credentials = toml::from_str(&content).unwrap();
        assert_eq!(parsed.server, "example.webuntis.com");
        assert_eq!(parsed.password, "secret");
    }
}
