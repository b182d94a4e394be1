use anyhow::Context;
use clap::Parser;
use mspd_proto::platform::DEFAULT_TCP_PORT;
use mspd_proto::protocol::{is_response_end, StatusLine};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "mspc", about = "Send one command to the music stream player daemon", version)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(short, long, default_value_t = DEFAULT_TCP_PORT)]
    port: u16,
    /// Command and arguments, e.g. `play 2` or `volume inc 5`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Response to one request: payload lines and the decoded status line.
struct Answer {
    payload: Vec<String>,
    status: StatusLine,
}

async fn request(host: &str, port: u16, command: &str) -> anyhow::Result<Answer> {
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("could not connect to mspd at {}:{}", host, port))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let greeting = lines
        .next_line()
        .await?
        .context("connection closed before greeting")?;
    if !greeting.starts_with("OK MSPD ") {
        anyhow::bail!("unexpected greeting '{}'", greeting);
    }
    debug!("connected: {}", greeting);

    write_half.write_all(format!("{}\n", command).as_bytes()).await?;

    let mut payload = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if is_response_end(&line) {
            let status = line.parse::<StatusLine>()?;
            return Ok(Answer { payload, status });
        }
        payload.push(line);
    }
    anyhow::bail!("connection closed before the response ended")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let answer = request(&args.host, args.port, &args.command.join(" ")).await?;

    for line in &answer.payload {
        println!("{}", line);
    }
    if !answer.status.is_ok() {
        eprintln!(
            "error {}: {}",
            answer.status.code,
            answer.status.message.as_deref().unwrap_or("")
        );
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-shot server that greets, reads a line and answers with `reply`.
    async fn fake_daemon(
        greeting: &'static str,
        reply: &'static str,
    ) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            write_half.write_all(greeting.as_bytes()).await.unwrap();
            let mut lines = BufReader::new(read_half).lines();
            let request = lines.next_line().await.unwrap().unwrap();
            write_half.write_all(reply.as_bytes()).await.unwrap();
            request
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_collects_payload_until_status_line() {
        let (port, server) = fake_daemon("OK MSPD 1.1.0\n", "1 FIP\n2 DLF\nOK 100\n").await;
        let answer = request("127.0.0.1", port, "stations").await.unwrap();
        assert_eq!(server.await.unwrap(), "stations");
        assert_eq!(answer.payload, vec!["1 FIP", "2 DLF"]);
        assert!(answer.status.is_ok());
    }

    #[tokio::test]
    async fn test_error_status_is_decoded() {
        let (port, _server) =
            fake_daemon("OK MSPD 1.1.0\n", "ERROR 201 Unknown command 'dance'.\n").await;
        let answer = request("127.0.0.1", port, "dance").await.unwrap();
        assert!(answer.payload.is_empty());
        assert_eq!(answer.status.code, 201);
        assert!(!answer.status.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_foreign_greeting() {
        let (port, _server) = fake_daemon("SSH-2.0-OpenSSH\n", "").await;
        let err = request("127.0.0.1", port, "version").await.err().unwrap();
        assert!(err.to_string().contains("unexpected greeting"));
    }
}
