//! Minimal Redis client speaking RESP over a single TCP connection.
//!
//! Only what the application needs is implemented: authentication, `PING`
//! for health checks and `QUIT` on shutdown.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::errors::ClientError;
use crate::health::{HealthCheck, HealthCheckResult};

const CLIENT_NAME: &str = "redisClient";
const DEFAULT_PORT: u16 = 6379;

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`
    Simple(String),
    /// `:42`
    Integer(i64),
    /// `$3\r\nfoo`, `None` for the null bulk string
    Bulk(Option<Vec<u8>>),
}

/// Connected Redis client.
#[derive(Debug)]
pub struct RedisClient {
    host: String,
    connection: Mutex<Option<BufStream<TcpStream>>>,
}

impl RedisClient {
    /// Opens the connection, authenticates when the url carries a password
    /// and checks the server answers `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, ClientError> {
        let url = url::Url::parse(&config.url).map_err(|error| ClientError::InvalidConfig {
            client: CLIENT_NAME,
            reason: error.to_string(),
        })?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ClientError::InvalidConfig {
                client: CLIENT_NAME,
                reason: "missing host".to_string(),
            })?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        let client = Self {
            host,
            connection: Mutex::new(Some(BufStream::new(stream))),
        };

        if let Some(password) = url.password() {
            let password = decode_credential(password)?;
            let user = decode_credential(url.username())?;
            let reply = if user.is_empty() {
                client.command(&["AUTH", password.as_str()]).await?
            } else {
                client.command(&["AUTH", user.as_str(), password.as_str()]).await?
            };
            expect_ok(&reply)?;
        }

        client.ping().await?;
        info!(host = %client.host, port, "{CLIENT_NAME} connected");
        Ok(client)
    }

    /// Host the client is connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Sends `PING`, returning the server's answer.
    pub async fn ping(&self) -> Result<String, ClientError> {
        match self.command(&["PING"]).await? {
            Reply::Simple(pong) => Ok(pong),
            Reply::Bulk(Some(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            other => Err(ClientError::Protocol(format!("unexpected PING reply {other:?}"))),
        }
    }

    /// Sends `QUIT` and drops the connection.
    ///
    /// Calling it again is a no-op.
    pub async fn quit(&self) -> Result<(), ClientError> {
        let mut guard = self.connection.lock().await;
        let Some(mut stream) = guard.take() else {
            return Ok(());
        };
        expect_ok(&exchange(&mut stream, &["QUIT"]).await?)?;
        info!(host = %self.host, "{CLIENT_NAME} disconnected");
        Ok(())
    }

    /// Sends one command and waits for its reply.
    ///
    /// The connection is taken out for the whole exchange: a command dropped
    /// between the write and the reply (a health check timing out, say)
    /// leaves the client disconnected instead of one reply behind. I/O and
    /// protocol failures disconnect it too.
    pub async fn command(&self, args: &[&str]) -> Result<Reply, ClientError> {
        let mut guard = self.connection.lock().await;
        let mut stream = guard.take().ok_or(ClientError::NotConnected(CLIENT_NAME))?;
        debug!(command = args.first().copied().unwrap_or_default(), "redis command");

        let reply = exchange(&mut stream, args).await;
        if matches!(reply, Ok(_) | Err(ClientError::Server(_))) {
            *guard = Some(stream);
        } else {
            warn!(host = %self.host, "{CLIENT_NAME} connection dropped");
        }
        reply
    }
}

#[async_trait]
impl HealthCheck for RedisClient {
    fn name(&self) -> &str {
        CLIENT_NAME
    }

    async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();
        match self.ping().await {
            Ok(_) => HealthCheckResult::healthy(format!("{CLIENT_NAME} OK"), start.elapsed()),
            Err(error) => HealthCheckResult::unhealthy(format!("{CLIENT_NAME} ERROR"), start.elapsed())
                .with_metadata("error", error.to_string()),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(2)
    }
}

fn decode_credential(raw: &str) -> Result<String, ClientError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|error| ClientError::InvalidConfig {
            client: CLIENT_NAME,
            reason: format!("credentials are not valid UTF-8: {error}"),
        })
}

async fn exchange(stream: &mut BufStream<TcpStream>, args: &[&str]) -> Result<Reply, ClientError> {
    write_command(stream, args).await?;
    read_reply(stream).await
}

fn expect_ok(reply: &Reply) -> Result<(), ClientError> {
    match reply {
        Reply::Simple(status) if status == "OK" => Ok(()),
        other => Err(ClientError::Protocol(format!("expected OK, got {other:?}"))),
    }
}

async fn write_command(stream: &mut BufStream<TcpStream>, args: &[&str]) -> Result<(), ClientError> {
    let mut frame = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        frame.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        frame.extend_from_slice(arg.as_bytes());
        frame.extend_from_slice(b"\r\n");
    }
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_reply(stream: &mut BufStream<TcpStream>) -> Result<Reply, ClientError> {
    let mut line = String::new();
    if stream.read_line(&mut line).await? == 0 {
        return Err(ClientError::Protocol("connection closed by server".to_string()));
    }
    let line = line.trim_end_matches(['\r', '\n']);
    let mut chars = line.chars();
    let kind = chars.next();
    let rest = chars.as_str();

    match kind {
        Some('+') => Ok(Reply::Simple(rest.to_string())),
        Some('-') => Err(ClientError::Server(rest.to_string())),
        Some(':') => rest
            .parse()
            .map(Reply::Integer)
            .map_err(|_| ClientError::Protocol(format!("bad integer reply '{rest}'"))),
        Some('$') => {
            let length: i64 = rest
                .parse()
                .map_err(|_| ClientError::Protocol(format!("bad bulk length '{rest}'")))?;
            let Ok(length) = usize::try_from(length) else {
                return Ok(Reply::Bulk(None));
            };
            let mut payload = vec![0; length + 2];
            stream.read_exact(&mut payload).await?;
            payload.truncate(length);
            Ok(Reply::Bulk(Some(payload)))
        }
        _ => Err(ClientError::Protocol(format!("unsupported reply '{line}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use std::sync::Arc;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    type Socket = BufReader<tokio::net::TcpStream>;

    /// Reads one RESP array command, `None` once the client hung up.
    async fn read_command(socket: &mut Socket) -> Option<Vec<String>> {
        let mut header = String::new();
        if socket.read_line(&mut header).await.unwrap() == 0 {
            return None;
        }
        let count: usize = header.trim()[1..].parse().unwrap();
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let mut length = String::new();
            socket.read_line(&mut length).await.unwrap();
            let mut arg = String::new();
            socket.read_line(&mut arg).await.unwrap();
            args.push(arg.trim_end().to_string());
        }
        Some(args)
    }

    /// Fake server answering AUTH, PING and QUIT; records every command.
    async fn fake_server(password: Option<&'static str>) -> (String, Arc<Mutex<Vec<Vec<String>>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            while let Some(args) = read_command(&mut socket).await {
                log.lock().await.push(args.clone());

                let reply = match args[0].as_str() {
                    "AUTH" if Some(args.last().unwrap().as_str()) == password => "+OK\r\n",
                    "AUTH" => "-WRONGPASS invalid password\r\n",
                    "PING" => "+PONG\r\n",
                    "QUIT" => "+OK\r\n",
                    _ => "-ERR unknown command\r\n",
                };
                socket.get_mut().write_all(reply.as_bytes()).await.unwrap();
                if args[0] == "QUIT" {
                    break;
                }
            }
        });

        (format!("127.0.0.1:{}", address.port()), seen)
    }

    /// Server numbering its PONGs and answering the second command late.
    async fn slow_server(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut served = 0;
            while let Some(args) = read_command(&mut socket).await {
                served += 1;
                if served == 2 {
                    tokio::time::sleep(delay).await;
                }
                let reply = match args[0].as_str() {
                    "PING" => format!("+PONG{served}\r\n"),
                    _ => "+OK\r\n".to_string(),
                };
                if socket.get_mut().write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        format!("127.0.0.1:{}", address.port())
    }

    #[tokio::test]
    async fn connects_and_pings() {
        let (address, seen) = fake_server(None).await;
        let client = RedisClient::connect(&RedisConfig {
            url: format!("redis://{address}"),
        })
        .await
        .unwrap();

        assert_eq!(client.host(), "127.0.0.1");
        assert_eq!(client.ping().await.unwrap(), "PONG");
        assert_eq!(seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn authenticates_with_the_url_password() {
        let (address, seen) = fake_server(Some("secret")).await;
        RedisClient::connect(&RedisConfig {
            url: format!("redis://:secret@{address}"),
        })
        .await
        .unwrap();

        assert_eq!(seen.lock().await[0], vec!["AUTH", "secret"]);
    }

    #[tokio::test]
    async fn wrong_password_is_a_server_error() {
        let (address, _) = fake_server(Some("secret")).await;
        let error = RedisClient::connect(&RedisConfig {
            url: format!("redis://admin:nope@{address}"),
        })
        .await
        .unwrap_err();

        assert!(matches!(error, ClientError::Server(message) if message.starts_with("WRONGPASS")));
    }

    #[tokio::test]
    async fn health_reports_ok_then_error_after_quit() {
        let (address, _) = fake_server(None).await;
        let client = RedisClient::connect(&RedisConfig {
            url: format!("redis://{address}"),
        })
        .await
        .unwrap();

        let result = client.check().await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.message, "redisClient OK");

        client.quit().await.unwrap();
        client.quit().await.unwrap();

        let result = client.check().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.message, "redisClient ERROR");
        assert!(matches!(
            client.ping().await,
            Err(ClientError::NotConnected("redisClient"))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_fails_to_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RedisClient::connect(&RedisConfig {
            url: format!("redis://127.0.0.1:{port}"),
        })
        .await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }

    #[tokio::test]
    async fn abandoned_command_disconnects_instead_of_desyncing() {
        let address = slow_server(Duration::from_millis(300)).await;
        let client = RedisClient::connect(&RedisConfig {
            url: format!("redis://{address}"),
        })
        .await
        .unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(50), client.ping()).await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(matches!(
            client.ping().await,
            Err(ClientError::NotConnected("redisClient"))
        ));
        assert_eq!(client.check().await.message, "redisClient ERROR");
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn percent_encoded_credentials_are_decoded() {
        let (address, seen) = fake_server(Some("p@ss word")).await;
        RedisClient::connect(&RedisConfig {
            url: format!("redis://admin:p%40ss%20word@{address}"),
        })
        .await
        .unwrap();

        assert_eq!(seen.lock().await[0], vec!["AUTH", "admin", "p@ss word"]);
    }
}
