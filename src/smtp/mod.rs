//! SMTP listener feeding the mail transaction in [`session`].
//!
//! Supports HELO/EHLO, AUTH PLAIN, MAIL FROM, RCPT TO, DATA, RSET, NOOP, QUIT.
//! Every read and write is bounded by the configured timeout.

pub mod error;
pub mod session;

pub use error::SessionError;
pub use session::{DeliveryReport, Session, SessionState};

use crate::{app::AppState, config::SmtpConfig, mime::BodyDecoder, util::extract_address};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use std::io;
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tracing::{debug, info, warn};

/// Longest command line accepted, CRLF included.
const MAX_COMMAND_LINE: usize = 4096;
/// Chunk size for DATA lines; longer lines are read in pieces.
const MAX_DATA_CHUNK: usize = 64 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub async fn start_smtp(state: AppState) -> Result<(), BoxError> {
    let listener = TcpListener::bind(state.config.smtp.addr).await?;
    info!("smtp listener: {}", listener.local_addr()?);
    serve(listener, state).await
}

/// Accept connections on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), BoxError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(state, stream).await {
                warn!("smtp connection error from {}: {}", peer, e);
            }
        });
    }
}

/// Line-oriented connection with a deadline on every operation.
struct Conn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl Conn {
    /// Read up to and including `\n`, at most `limit` bytes. Returns 0 on EOF.
    async fn read_line(&mut self, buf: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
        buf.clear();
        let mut limited = (&mut self.reader).take(limit as u64);
        timeout(self.timeout, limited.read_until(b'\n', buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?
    }

    async fn reply(&mut self, line: &str) -> io::Result<()> {
        debug!("smtp => {}", line);
        let out = format!("{line}\r\n");
        timeout(self.timeout, async {
            self.writer.write_all(out.as_bytes()).await?;
            self.writer.flush().await
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?
    }
}

async fn handle_client(state: AppState, stream: TcpStream) -> Result<(), BoxError> {
    let (read_half, writer) = stream.into_split();
    let mut conn = Conn {
        reader: BufReader::new(read_half),
        writer,
        timeout: state.config.smtp.timeout,
    };
    let mut session = Session::new(state.mailboxes.clone(), state.messages.clone())
        .with_decoder(BodyDecoder::new(state.config.smtp.part_precedence));

    let result = converse(&mut conn, &mut session, &state.config.smtp, state.mailboxes.domain()).await;
    session.logout();
    match result {
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
            debug!("smtp connection timed out");
            let _ = conn.reply("421 4.4.2 Timeout, closing connection").await;
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

async fn converse(
    conn: &mut Conn,
    session: &mut Session,
    cfg: &SmtpConfig,
    domain: &str,
) -> io::Result<()> {
    conn.reply(&format!("220 {domain} ESMTP tempmail")).await?;

    let mut buf = Vec::new();
    loop {
        let n = conn.read_line(&mut buf, MAX_COMMAND_LINE).await?;
        if n == 0 {
            break;
        }
        if !buf.ends_with(b"\n") {
            conn.reply("500 5.5.2 Line too long").await?;
            break;
        }
        let raw = String::from_utf8_lossy(&buf);
        let line = raw.trim_end_matches(['\r', '\n']);
        debug!("smtp <= {}", line);
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.trim()),
            None => (line.to_ascii_uppercase(), ""),
        };

        match verb.as_str() {
            "EHLO" => {
                conn.reply(&format!("250-{domain} greets {arg}")).await?;
                conn.reply("250-AUTH PLAIN").await?;
                conn.reply(&format!("250-SIZE {}", cfg.max_message_bytes)).await?;
                conn.reply("250 8BITMIME").await?;
            }
            "HELO" => conn.reply(&format!("250 {domain}")).await?,
            "AUTH" => auth(conn, session, arg).await?,
            "MAIL" => match strip_prefix_ci(arg, "FROM:") {
                Some(rest) => {
                    let (path, params) = split_path(rest);
                    if declared_size(params).is_some_and(|size| size > cfg.max_message_bytes) {
                        conn.reply("552 5.3.4 Message size exceeds fixed limit").await?;
                    } else {
                        session.set_sender(&path);
                        conn.reply("250 2.1.0 OK").await?;
                    }
                }
                None => conn.reply("501 5.5.4 Syntax: MAIL FROM:<address>").await?,
            },
            "RCPT" => match strip_prefix_ci(arg, "TO:") {
                Some(rest) => {
                    let (path, _) = split_path(rest);
                    if session.state() == SessionState::RecipientsAccepted
                        && session.recipients().len() >= cfg.max_recipients
                    {
                        let err = SessionError::TooManyRecipients(cfg.max_recipients);
                        conn.reply(&err.reply()).await?;
                        continue;
                    }
                    match session.add_recipient(&path).await {
                        Ok(()) => conn.reply("250 2.1.5 OK").await?,
                        Err(e) => conn.reply(&e.reply()).await?,
                    }
                }
                None => conn.reply("501 5.5.4 Syntax: RCPT TO:<address>").await?,
            },
            "DATA" => {
                if let Err(e) = session.ready_for_body() {
                    conn.reply(&e.reply()).await?;
                    continue;
                }
                conn.reply("354 End data with <CR><LF>.<CR><LF>").await?;
                match read_data(conn, cfg.max_message_bytes).await? {
                    Data::Eof => {
                        debug!("connection closed before end of data, message discarded");
                        break;
                    }
                    Data::TooLarge => {
                        conn.reply("552 5.3.4 Message size exceeds fixed limit").await?;
                    }
                    Data::Complete(body) => match session.receive_body(&body).await {
                        Ok(report) => {
                            info!(
                                "smtp delivery: delivered={} failed={}",
                                report.delivered, report.failed
                            );
                            conn.reply("250 2.0.0 OK: queued").await?;
                        }
                        Err(e) => conn.reply(&e.reply()).await?,
                    },
                }
                session.reset();
            }
            "RSET" => {
                session.reset();
                conn.reply("250 2.0.0 OK").await?;
            }
            "NOOP" => conn.reply("250 2.0.0 OK").await?,
            "QUIT" => {
                conn.reply("221 2.0.0 Bye").await?;
                break;
            }
            _ => conn.reply("502 5.5.2 Command not implemented").await?,
        }
    }
    Ok(())
}

/// AUTH PLAIN, with the initial response inline or after a 334 prompt.
async fn auth(conn: &mut Conn, session: &mut Session, arg: &str) -> io::Result<()> {
    let mut parts = arg.split_whitespace();
    let mechanism = parts.next().unwrap_or_default();
    if !mechanism.eq_ignore_ascii_case("PLAIN") {
        return conn.reply("504 5.5.4 Unrecognized authentication type").await;
    }

    let token = match parts.next() {
        Some(t) => t.to_string(),
        None => {
            conn.reply("334 ").await?;
            let mut buf = Vec::new();
            if conn.read_line(&mut buf, MAX_COMMAND_LINE).await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            String::from_utf8_lossy(&buf)
                .trim_end_matches(['\r', '\n'])
                .to_string()
        }
    };
    if token == "*" {
        return conn.reply("501 5.7.0 Authentication cancelled").await;
    }

    // "authzid\0username\0password"
    let Ok(decoded) = B64.decode(token.trim()) else {
        return conn.reply("501 5.5.2 Malformed AUTH input").await;
    };
    let mut fields = decoded.split(|b| *b == 0).skip(1);
    let username = String::from_utf8_lossy(fields.next().unwrap_or_default()).into_owned();
    let password = String::from_utf8_lossy(fields.next().unwrap_or_default()).into_owned();
    match session.auth_plain(&username, &password) {
        Ok(()) => conn.reply("235 2.7.0 Authentication successful").await,
        Err(e) => conn.reply(&e.reply()).await,
    }
}

enum Data {
    Complete(Vec<u8>),
    TooLarge,
    Eof,
}

/// Read a DATA payload up to the lone `.` line, undoing dot-stuffing.
/// Oversized payloads are drained and reported as [`Data::TooLarge`].
async fn read_data(conn: &mut Conn, max: usize) -> io::Result<Data> {
    let mut data = Vec::new();
    let mut too_large = false;
    let mut at_line_start = true;
    let mut line = Vec::new();

    loop {
        if conn.read_line(&mut line, MAX_DATA_CHUNK).await? == 0 {
            return Ok(Data::Eof);
        }
        let starts_line = at_line_start;
        at_line_start = line.ends_with(b"\n");

        let mut chunk = &line[..];
        if starts_line {
            if chunk == b".\r\n" || chunk == b".\n" {
                break;
            }
            if chunk.first() == Some(&b'.') {
                chunk = &chunk[1..];
            }
        }
        if too_large {
            continue;
        }
        if data.len() + chunk.len() > max {
            too_large = true;
            data = Vec::new();
            continue;
        }
        data.extend_from_slice(chunk);
    }

    Ok(if too_large {
        Data::TooLarge
    } else {
        Data::Complete(data)
    })
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| s[prefix.len()..].trim_start())
}

/// Split `<path> PARAM=...` into the address and the parameter string.
fn split_path(rest: &str) -> (String, &str) {
    let rest = rest.trim();
    if rest.starts_with('<') {
        if let Some(end) = rest.find('>') {
            return (extract_address(&rest[..=end]), rest[end + 1..].trim());
        }
    }
    match rest.split_once(char::is_whitespace) {
        Some((path, params)) => (path.to_string(), params.trim()),
        None => (rest.to_string(), ""),
    }
}

fn declared_size(params: &str) -> Option<usize> {
    params
        .split_whitespace()
        .find_map(|p| strip_prefix_ci(p, "SIZE="))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_paths_and_params() {
        assert_eq!(split_path("<a@b.c> SIZE=10"), ("a@b.c".to_string(), "SIZE=10"));
        assert_eq!(split_path(" <> "), (String::new(), ""));
        assert_eq!(split_path("a@b.c"), ("a@b.c".to_string(), ""));
        assert_eq!(declared_size("BODY=8BITMIME size=2048"), Some(2048));
        assert_eq!(declared_size(""), None);
    }

    #[test]
    fn strips_prefix_case_insensitively() {
        assert_eq!(strip_prefix_ci("from:<x@y>", "FROM:"), Some("<x@y>"));
        assert_eq!(strip_prefix_ci("FROM: <x@y>", "FROM:"), Some("<x@y>"));
        assert_eq!(strip_prefix_ci("TO:<x@y>", "FROM:"), None);
        assert_eq!(strip_prefix_ci("F", "FROM:"), None);
    }
}
