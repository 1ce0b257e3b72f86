//! Any-state and not-authenticated commands: STARTTLS, LOGIN, AUTHENTICATE
//! and the setup that follows a successful login.

use super::Session;
use crate::command::Command;
use crate::connection::framed::FramedStream;
use crate::connection::state::SessionState;
use crate::connection::stream::Transport;
use crate::extension::Extension;
use crate::parser::{ParseContext, Step, UntaggedResponse};
use crate::sasl::{self, OAuthError, SaslMechanism};
use crate::types::{CapabilitySet, ResponseCode};
use crate::{Error, Result};

type IdParameters = Vec<(String, Option<String>)>;

/// NO on LOGIN/AUTHENTICATE means the credentials were rejected.
fn auth_error(error: Error) -> Error {
    match error {
        Error::No { text, .. } => Error::Auth(text),
        other => other,
    }
}

/// True if the cycle delivered a fresh capability list.
fn reports_capabilities(ctx: &ParseContext) -> bool {
    let in_completion = ctx
        .completion()
        .is_some_and(|c| matches!(c.code, Some(ResponseCode::Capability(_))));
    in_completion
        || ctx.responses().iter().any(|r| {
            matches!(
                r,
                UntaggedResponse::Capability(_)
                    | UntaggedResponse::Ok {
                        code: Some(ResponseCode::Capability(_)),
                        ..
                    }
            )
        })
}

impl<S: Transport> Session<S> {
    /// Re-queries the server capabilities.
    pub async fn capability(&mut self) -> Result<CapabilitySet> {
        self.refresh_capabilities().await?;
        Ok(self.capabilities.clone())
    }

    /// Sends NOOP, picking up any pending mailbox updates.
    pub async fn noop(&mut self) -> Result<()> {
        self.run(&Command::Noop).await?;
        Ok(())
    }

    /// Logs out. The session is unusable afterwards.
    pub async fn logout(&mut self) -> Result<()> {
        let result = self.run(&Command::Logout).await;
        self.state = SessionState::Logout;
        self.scope = None;
        match result {
            // Some servers close right after BYE.
            Ok(_) | Err(Error::ConnectionLost) => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Upgrades the connection with STARTTLS and re-reads the capabilities.
    pub async fn starttls(&mut self) -> Result<()> {
        self.run(&Command::StartTls).await?;

        let framed = self.framed.take().ok_or(Error::ConnectionLost)?;
        let stream = match framed.into_inner() {
            Ok(stream) => stream,
            Err(error) => {
                self.state = SessionState::Logout;
                return Err(error);
            }
        };
        let limit = self.config.connect_timeout;
        let upgraded = tokio::time::timeout(limit, stream.start_tls(&self.config.host))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(limit)));
        match upgraded {
            Ok(stream) => self.framed = Some(FramedStream::new(stream)),
            Err(error) => {
                tracing::warn!(%error, "TLS handshake failed");
                self.state = SessionState::Logout;
                return Err(error);
            }
        }
        tracing::info!(host = %self.config.host, "TLS established");

        // Pre-TLS capabilities may have been forged.
        self.invalidate_capabilities();
        self.refresh_capabilities().await
    }

    /// Authenticates with LOGIN.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.capabilities.has("LOGINDISABLED") {
            return Err(Error::Auth("LOGIN disabled by server".to_string()));
        }
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let ctx = self.run(&command).await.map_err(auth_error)?;
        self.authenticated(username, reports_capabilities(&ctx)).await
    }

    /// Authenticates with a SASL mechanism.
    ///
    /// The initial response goes inline when SASL-IR is available,
    /// otherwise after the server's first empty challenge.
    pub async fn authenticate(&mut self, mechanism: &SaslMechanism) -> Result<()> {
        let name = mechanism.name();
        let response = mechanism.initial_response();
        let inline = self.supports(Extension::SaslIr);
        let command = Command::Authenticate {
            mechanism: name.to_string(),
            initial_response: inline.then(|| response.clone()),
        };
        self.ensure_allowed(&command).await?;
        if !self.capabilities_known {
            self.refresh_capabilities().await?;
        }
        if !self.capabilities.has_auth(name) {
            return Err(Error::CapabilityMissing(format!("AUTH={name}")));
        }

        let tag = self.tags.next();
        tracing::debug!(%tag, mechanism = name, inline, "sending command");
        let mut ctx = ParseContext::new(tag.clone());
        for chunk in command.encode(&tag, false) {
            self.write(&chunk).await?;
        }

        let mut sent = inline;
        loop {
            match self.next_step(&mut ctx).await? {
                Step::Done => break,
                Step::Continuation(challenge) => {
                    let reply = if sent {
                        rejection_reply(mechanism, challenge.as_deref())
                    } else {
                        sent = true;
                        sasl::encode_response(&response)
                    };
                    self.write(format!("{reply}\r\n").as_bytes()).await?;
                }
                Step::Untagged | Step::ForeignTag(_) => {}
            }
        }

        let completion = ctx
            .completion()
            .cloned()
            .ok_or_else(|| Error::Protocol("missing completion".to_string()))?;
        completion.into_result().map_err(auth_error)?;
        self.authenticated(mechanism.user(), reports_capabilities(&ctx))
            .await
    }

    async fn authenticated(&mut self, username: &str, has_capabilities: bool) -> Result<()> {
        self.state = SessionState::Authenticated;
        self.username = Some(username.to_string());
        tracing::info!(user = username, "authenticated");
        if !has_capabilities {
            self.invalidate_capabilities();
            self.refresh_capabilities().await?;
        }
        self.post_login().await
    }

    /// Sends ID, ENABLE and COMPRESS as configured and supported.
    ///
    /// A NO or BAD from any of them is logged and ignored.
    async fn post_login(&mut self) -> Result<()> {
        if let Some(parameters) = self.config.client_id.clone()
            && self.supports(Extension::Id)
        {
            let parameters = parameters.into_iter().map(|(k, v)| (k, Some(v))).collect();
            tolerate(self.id(Some(parameters)).await.map(drop), "ID")?;
        }

        if self.supports(Extension::Enable) {
            let wanted: &[&str] = if self.supports(Extension::QResync) {
                &["CONDSTORE", "QRESYNC"]
            } else if self.supports(Extension::CondStore) {
                &["CONDSTORE"]
            } else {
                &[]
            };
            if !wanted.is_empty() {
                tolerate(self.enable(wanted).await.map(drop), "ENABLE")?;
            }
        }

        if self.config.compress && self.supports(Extension::CompressDeflate) {
            tolerate(self.compress().await, "COMPRESS")?;
        }
        Ok(())
    }

    /// Exchanges ID parameters (RFC 2971).
    pub async fn id(&mut self, parameters: Option<IdParameters>) -> Result<Option<IdParameters>> {
        let ctx = self.run(&Command::Id { parameters }).await?;
        Ok(ctx.into_responses().into_iter().find_map(|r| match r {
            UntaggedResponse::Id(server) => server,
            _ => None,
        }))
    }

    /// Enables extensions (RFC 5161). Returns what the server confirmed.
    pub async fn enable(&mut self, capabilities: &[&str]) -> Result<Vec<String>> {
        let command = Command::Enable {
            capabilities: capabilities.iter().map(ToString::to_string).collect(),
        };
        let ctx = self.run(&command).await?;
        let confirmed: Vec<String> = ctx
            .into_responses()
            .into_iter()
            .filter_map(|r| match r {
                UntaggedResponse::Enabled(list) => Some(list),
                _ => None,
            })
            .flatten()
            .collect();
        tracing::debug!(?confirmed, "extensions enabled");
        Ok(confirmed)
    }

    /// Turns on COMPRESS=DEFLATE (RFC 4978) for the rest of the connection.
    pub async fn compress(&mut self) -> Result<()> {
        if self.is_compressed() {
            return Ok(());
        }
        self.run(&Command::Compress).await?;
        let result = match self.framed.as_mut() {
            Some(framed) => framed.enable_compression(),
            None => Err(Error::ConnectionLost),
        };
        if let Err(error) = result {
            self.state = SessionState::Logout;
            return Err(error);
        }
        tracing::info!("compression active");
        Ok(())
    }
}

/// Answer to a challenge that follows the client response, which only
/// happens when the server is about to reject it.
fn rejection_reply(mechanism: &SaslMechanism, challenge: Option<&str>) -> String {
    if let Some(payload) = sasl::decode_challenge(challenge)
        && let Ok(error) = OAuthError::parse(&payload)
    {
        tracing::warn!(status = %error.status, scope = ?error.scope, "token rejected");
    }
    match mechanism {
        // RFC 7628: acknowledge the error with a lone %x01.
        SaslMechanism::OAuthBearer { .. } => sasl::encode_response(&[0x01]),
        SaslMechanism::XOAuth2 { .. } => String::new(),
        SaslMechanism::Plain { .. } => "*".to_string(),
    }
}

/// Keeps optional setup steps from failing the login.
fn tolerate(result: Result<()>, step: &'static str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(error) if error.is_connection_fatal() => Err(error),
        Err(error) => {
            tracing::warn!(%error, step, "optional setup step failed");
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;
    use crate::connection::config::Config;

    fn config() -> Config {
        Config::builder("imap.example.com")
            .io_timeout(Duration::from_secs(5))
            .build()
    }

    #[tokio::test]
    async fn test_login_requeries_capabilities_without_code() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
            .write(b"A0000 LOGIN alice secret\r\n")
            .read(b"A0000 OK logged in\r\n")
            .write(b"A0001 CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 IDLE MOVE\r\nA0001 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.login("alice", "secret").await.unwrap();
        assert_eq!(session.state(), &SessionState::Authenticated);
        assert!(session.supports(Extension::Move));
    }

    #[tokio::test]
    async fn test_login_rejected_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice wrong\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] bad credentials\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let error = session.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(error, Error::Auth(text) if text == "bad credentials"));
        assert_eq!(session.state(), &SessionState::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_login_disabled_sends_nothing() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        assert!(matches!(session.login("a", "b").await, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_authenticate_plain_with_continuation() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
            .write(b"A0000 AUTHENTICATE PLAIN\r\n")
            .read(b"+ \r\n")
            .write(b"AGFsaWNlAHNlY3JldA==\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1] welcome\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let mechanism = SaslMechanism::Plain {
            username: "alice".into(),
            password: "secret".into(),
        };
        session.authenticate(&mechanism).await.unwrap();
        assert_eq!(session.state(), &SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_oauth_inline_rejected() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=OAUTHBEARER] ready\r\n")
            .write(b"A0000 AUTHENTICATE OAUTHBEARER bixhPWFAYi5jLAFhdXRoPUJlYXJlciB0AQE=\r\n")
            .read(b"+ eyJzdGF0dXMiOiI0MDEifQ==\r\n")
            .write(b"AQ==\r\n")
            .read(b"A0000 NO token expired\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let mechanism = SaslMechanism::OAuthBearer {
            user: "a@b.c".into(),
            token: "t".into(),
        };
        let error = session.authenticate(&mechanism).await.unwrap_err();
        assert!(matches!(error, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_post_login_enables_condstore_and_compresses() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE COMPRESS=DEFLATE] ready\r\n")
            .write(b"A0000 LOGIN u p\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE COMPRESS=DEFLATE] ok\r\n")
            .write(b"A0001 ENABLE CONDSTORE\r\n")
            .read(b"* ENABLED CONDSTORE\r\nA0001 OK enabled\r\n")
            .write(b"A0002 COMPRESS DEFLATE\r\n")
            .read(b"A0002 OK deflating\r\n")
            .build();
        let config = Config::builder("imap.example.com").compress(true).build();
        let mut session = Session::from_stream(mock, config).await.unwrap();
        session.login("u", "p").await.unwrap();
        assert_eq!(session.enabled(), ["CONDSTORE".to_string()]);
        assert!(session.is_compressed());
    }
}
