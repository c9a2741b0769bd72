//! Opening authenticated connections.
//!
//! Enough of the not-authenticated state to get from a socket to a logged-in
//! connection: greeting, optional STARTTLS, LOGIN. Everything after that is
//! the monitor's business.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite};

use super::config::{Config, Security};
use super::framed::FramedStream;
use super::stream::{ImapStream, connect};
use crate::command::Command;
use crate::{Error, Result};

const STARTTLS_TAG: &str = "A0001";
const LOGIN_TAG: &str = "A0002";

/// What the server said when we connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    /// `* OK`: LOGIN required.
    Ok,
    /// `* PREAUTH`: already authenticated.
    PreAuth,
}

/// Connects, secures, and logs in, all within `config.connect_timeout`.
pub async fn open_authenticated(
    config: &Config,
    username: &str,
    password: &str,
) -> Result<FramedStream<ImapStream>> {
    tokio::time::timeout(config.connect_timeout, open(config, username, password))
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))?
}

async fn open(config: &Config, username: &str, password: &str) -> Result<FramedStream<ImapStream>> {
    let mut framed = FramedStream::new(connect(config).await?);
    let mut greeting = read_greeting(&mut framed).await?;

    if config.security == Security::StartTls {
        run(&mut framed, STARTTLS_TAG, &Command::StartTls).await?;
        let stream = framed.into_inner().upgrade_to_tls(&config.host).await?;
        framed = FramedStream::new(stream);
        // A PREAUTH before STARTTLS does not survive the upgrade.
        greeting = Greeting::Ok;
    }

    if greeting == Greeting::Ok {
        login(&mut framed, username, password).await?;
    }
    tracing::debug!(host = %config.host, "authenticated");
    Ok(framed)
}

/// Reads and checks the server greeting.
pub async fn read_greeting<S>(framed: &mut FramedStream<S>) -> Result<Greeting>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = framed.read_line().await?;
    let Some(rest) = line.strip_prefix("* ") else {
        return Err(Error::ProtocolViolation(format!("unexpected greeting: {line}")));
    };
    let (status, text) = rest.split_once(' ').unwrap_or((rest, ""));
    match status.to_ascii_uppercase().as_str() {
        "OK" => Ok(Greeting::Ok),
        "PREAUTH" => Ok(Greeting::PreAuth),
        "BYE" => Err(Error::Bye(text.to_string())),
        _ => Err(Error::ProtocolViolation(format!("unexpected greeting: {line}"))),
    }
}

/// Sends LOGIN and waits for its completion.
pub async fn login<S>(framed: &mut FramedStream<S>, username: &str, password: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let command = Command::Login {
        username: username.to_string(),
        password: password.to_string(),
    };
    match run(framed, LOGIN_TAG, &command).await {
        Err(Error::No(text)) => Err(Error::Auth(text)),
        other => other,
    }
}

async fn run<S>(framed: &mut FramedStream<S>, tag: &str, command: &Command) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = command.serialize(tag);
    if command.is_sensitive() {
        tracing::trace!("IMAP>> {tag} LOGIN ***");
    } else {
        tracing::trace!("IMAP>> {line}");
    }
    framed.write_line(&line).await?;

    let lines = framed.read_until_tagged(tag).await?;
    if let Some(bye) = lines.iter().find_map(|l| l.strip_prefix("* BYE")) {
        return Err(Error::Bye(bye.trim_start().to_string()));
    }
    let completion = lines.last().map_or("", |l| l[tag.len()..].trim_start());
    check_completion(completion)
}

fn check_completion(completion: &str) -> Result<()> {
    let (status, text) = completion.split_once(' ').unwrap_or((completion, ""));
    match status.to_ascii_uppercase().as_str() {
        "OK" => Ok(()),
        "NO" => Err(Error::No(text.to_string())),
        "BAD" => Err(Error::Bad(text.to_string())),
        _ => Err(Error::ProtocolViolation(format!("bad completion: {completion}"))),
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
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_greeting_ok() {
        let mock = Builder::new().read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(read_greeting(&mut framed).await.unwrap(), Greeting::Ok);
    }

    #[tokio::test]
    async fn test_greeting_preauth() {
        let mock = Builder::new().read(b"* PREAUTH welcome back\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(read_greeting(&mut framed).await.unwrap(), Greeting::PreAuth);
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let mut framed = FramedStream::new(mock);
        match read_greeting(&mut framed).await {
            Err(Error::Bye(text)) => assert_eq!(text, "too many connections"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_ok() {
        let mock = Builder::new()
            .write(b"A0002 LOGIN user secret\r\n")
            .read(b"* CAPABILITY IMAP4rev1 NOTIFY IDLE\r\n")
            .read(b"A0002 OK LOGIN completed\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        login(&mut framed, "user", "secret").await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .write(b"A0002 LOGIN user wrong\r\n")
            .read(b"A0002 NO [AUTHENTICATIONFAILED] invalid credentials\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        match login(&mut framed, "user", "wrong").await {
            Err(Error::Auth(text)) => assert!(text.contains("invalid credentials")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_bad() {
        let mock = Builder::new()
            .write(b"A0002 LOGIN user secret\r\n")
            .read(b"A0002 BAD syntax\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(
            login(&mut framed, "user", "secret").await,
            Err(Error::Bad(_))
        ));
    }

    #[test]
    fn test_check_completion() {
        assert!(check_completion("OK done").is_ok());
        assert!(check_completion("ok").is_ok());
        assert!(matches!(check_completion("NO nope"), Err(Error::No(_))));
        assert!(matches!(
            check_completion("MAYBE"),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
