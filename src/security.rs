use std::path::Path;

use crate::context::{SessionContext, SharefileSettings};
use crate::errors::{AppError, AppResult};

pub struct InputValidator;

impl InputValidator {
    /// Every field the upload path reads from the session must be present
    /// before anything else happens.
    pub fn validate_session(session: &SessionContext) -> AppResult<()> {
        session.secret_key()?;
        session.imei()?;
        session.cookie()?;
        session.user_agent()?;
        session.file_service_url()?;
        if session.sharefile()?.chunk_size_file == 0 {
            return Err(AppError::configuration("Sharefile chunk size is zero"));
        }
        Ok(())
    }

    pub fn validate_upload_request(
        settings: &SharefileSettings,
        file_paths: &[String],
        thread_id: &str,
    ) -> AppResult<()> {
        if file_paths.is_empty() {
            return Err(AppError::invalid_argument("file_paths", "Missing filePaths"));
        }

        if file_paths.len() > settings.max_file {
            return Err(AppError::invalid_argument(
                "file_paths",
                &format!("Exceed maximum file of {}", settings.max_file),
            ));
        }

        if thread_id.trim().is_empty() {
            return Err(AppError::invalid_argument("thread_id", "Missing threadId"));
        }

        Ok(())
    }

    pub fn validate_extension(settings: &SharefileSettings, ext: &str) -> AppResult<()> {
        if settings.is_extension_restricted(ext) {
            return Err(AppError::Policy(format!(
                "File extension \"{}\" is not allowed",
                ext
            )));
        }
        Ok(())
    }

    pub fn validate_file_size(
        settings: &SharefileSettings,
        file_name: &str,
        size: u64,
    ) -> AppResult<()> {
        if size > settings.max_size_bytes() {
            return Err(AppError::Policy(format!(
                "File {} size exceed maximum size of {}MB",
                file_name, settings.max_size_share_file_v3
            )));
        }
        Ok(())
    }

    pub fn validate_file_exists(path: &str) -> AppResult<()> {
        let path_obj = Path::new(path);
        if !path_obj.is_file() {
            return Err(AppError::not_found(path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SharefileSettings {
        SharefileSettings {
            max_file: 5,
            max_size_share_file_v3: 1,
            restricted_ext_file: vec!["exe".to_string(), "bat".to_string()],
            chunk_size_file: 1024,
        }
    }

    fn ready_session() -> SessionContext {
        let mut session = SessionContext::new();
        session.secret_key = Some("AAAAAAAAAAAAAAAAAAAAAA==".to_string());
        session.imei = Some("imei".to_string());
        session.cookie = Some("zpw_sek=abc".to_string());
        session.user_agent = Some("Mozilla/5.0".to_string());
        session.file_service_url = Some("https://files.example/api".to_string());
        session.sharefile = Some(settings());
        session
    }

    #[test]
    fn test_session_validation() {
        assert!(InputValidator::validate_session(&ready_session()).is_ok());

        let mut session = ready_session();
        session.imei = None;
        match InputValidator::validate_session(&session) {
            Err(AppError::Configuration(message)) => assert_eq!(message, "IMEI is not available"),
            other => panic!("unexpected result: {:?}", other),
        }

        let mut session = ready_session();
        session.sharefile = None;
        assert!(matches!(
            InputValidator::validate_session(&session),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_request_validation() {
        let settings = settings();
        let five: Vec<String> = (0..5).map(|i| format!("{}.txt", i)).collect();
        let six: Vec<String> = (0..6).map(|i| format!("{}.txt", i)).collect();

        assert!(InputValidator::validate_upload_request(&settings, &five, "42").is_ok());
        assert!(matches!(
            InputValidator::validate_upload_request(&settings, &six, "42"),
            Err(AppError::InvalidArgument { .. })
        ));
        assert!(InputValidator::validate_upload_request(&settings, &[], "42").is_err());
        assert!(InputValidator::validate_upload_request(&settings, &five, "  ").is_err());
    }

    #[test]
    fn test_policy_checks() {
        let settings = settings();
        assert!(matches!(
            InputValidator::validate_extension(&settings, "exe"),
            Err(AppError::Policy(_))
        ));
        assert!(InputValidator::validate_extension(&settings, "png").is_ok());

        assert!(InputValidator::validate_file_size(&settings, "a.mp4", 1024 * 1024).is_ok());
        let err = InputValidator::validate_file_size(&settings, "a.mp4", 1024 * 1024 + 1)
            .unwrap_err()
            .to_string();
        assert!(err.contains("a.mp4"));
        assert!(err.contains("1MB"));
    }
}
