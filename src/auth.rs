use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Cleartext password source shared by every connection. The daemon has a
/// single service password; per-user accounts live in the booking data
/// itself, not in the wire authentication layer.
#[derive(Debug)]
pub struct BunkdAuthSource {
    password: String,
}

impl BunkdAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for BunkdAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
