use crate::SigningError;
use mason_schema::{BuildMetadata, UserConfig, DEFAULT_SIGNING_PROGRAM};

/// Who signs and with what program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    pub program: String,
    pub email: String,
}

/// Non-empty user config values override metadata. The program falls back to
/// `gpg`; the email has no fallback.
pub fn resolve_signing_identity(
    meta: &BuildMetadata,
    user: &UserConfig,
) -> Result<SigningIdentity, SigningError> {
    let program = [&user.signing.program, &meta.sign_info.program]
        .into_iter()
        .find(|p| !p.is_empty())
        .map_or(DEFAULT_SIGNING_PROGRAM, String::as_str);

    let email = [&user.user.email, &meta.sign_info.email]
        .into_iter()
        .find(|e| !e.is_empty())
        .ok_or(SigningError::NoIdentity)?;

    Ok(SigningIdentity {
        program: program.to_owned(),
        email: email.clone(),
    })
}
