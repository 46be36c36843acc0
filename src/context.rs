use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub const API_TYPE: u32 = 30;
pub const API_VERSION: u32 = 637;

/// Share-file limits published by the server after login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharefileSettings {
    pub max_file: usize,
    /// Per-file limit in megabytes.
    pub max_size_share_file_v3: u64,
    #[serde(default)]
    pub restricted_ext_file: Vec<String>,
    pub chunk_size_file: u64,
}

impl SharefileSettings {
    /// Read `settings.features.sharefile` out of a server info payload.
    ///
    /// The server currently spells the top-level key `setttings`; both
    /// spellings are accepted.
    pub fn from_server_info(server_info: &serde_json::Value) -> AppResult<Self> {
        let sharefile = server_info
            .get("setttings")
            .or_else(|| server_info.get("settings"))
            .and_then(|settings| settings.get("features"))
            .and_then(|features| features.get("sharefile"))
            .ok_or_else(|| AppError::configuration("Server info has no sharefile settings"))?;

        Ok(serde_json::from_value(sharefile.clone())?)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_share_file_v3 * 1024 * 1024
    }

    pub fn is_extension_restricted(&self, ext: &str) -> bool {
        self.restricted_ext_file
            .iter()
            .any(|restricted| restricted.eq_ignore_ascii_case(ext))
    }
}

/// Everything the uploader needs from a logged-in session.
///
/// Populated by the login flow; the uploader only reads it and refuses to
/// run while a required field is still missing.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub secret_key: Option<String>,
    pub imei: Option<String>,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub uid: Option<String>,
    /// Base of the file service, e.g. `https://tt-files-wpa.chat.zalo.me/api`.
    pub file_service_url: Option<String>,
    pub sharefile: Option<SharefileSettings>,
    pub api_version: u32,
    pub api_type: u32,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            api_version: API_VERSION,
            api_type: API_TYPE,
            ..Default::default()
        }
    }

    pub fn secret_key(&self) -> AppResult<&str> {
        required(&self.secret_key, "Secret key is not available")
    }

    pub fn imei(&self) -> AppResult<&str> {
        required(&self.imei, "IMEI is not available")
    }

    pub fn cookie(&self) -> AppResult<&str> {
        required(&self.cookie, "Cookie is not available")
    }

    pub fn user_agent(&self) -> AppResult<&str> {
        required(&self.user_agent, "User agent is not available")
    }

    pub fn file_service_url(&self) -> AppResult<&str> {
        required(&self.file_service_url, "File service URL is not available")
    }

    pub fn sharefile(&self) -> AppResult<&SharefileSettings> {
        self.sharefile
            .as_ref()
            .ok_or_else(|| AppError::configuration("Sharefile settings are not available"))
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("vi")
    }
}

fn required<'a>(value: &'a Option<String>, message: &str) -> AppResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::configuration(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sharefile_from_misspelled_settings() {
        let info = json!({
            "setttings": {
                "features": {
                    "sharefile": {
                        "max_file": 10,
                        "max_size_share_file_v3": 1024,
                        "restricted_ext_file": ["exe", "apk"],
                        "chunk_size_file": 3145728,
                        "big_file_domain_list": []
                    }
                }
            }
        });

        let settings = SharefileSettings::from_server_info(&info).unwrap();
        assert_eq!(settings.max_file, 10);
        assert_eq!(settings.chunk_size_file, 3_145_728);
        assert_eq!(settings.max_size_bytes(), 1024 * 1024 * 1024);
        assert!(settings.is_extension_restricted("EXE"));
        assert!(!settings.is_extension_restricted("png"));
    }

    #[test]
    fn test_sharefile_missing() {
        let info = json!({ "settings": { "features": {} } });
        assert!(matches!(
            SharefileSettings::from_server_info(&info),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_fields_count_as_missing() {
        let mut session = SessionContext::new();
        session.secret_key = Some(String::new());
        assert!(session.secret_key().is_err());
        assert_eq!(session.api_version, API_VERSION);
        assert_eq!(session.language(), "vi");
    }
}
