use crate::dispatch::Dispatcher;
use mspd_proto::protocol::hello;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub async fn bind(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind TCP socket {}: {}", addr, e))?;
    info!("TCP server listening at {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept loop.  Each connection gets its own task and is answered strictly
/// in order, one request line at a time.
pub fn start_server(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, dispatcher, id).await {
                            error!("Client {}: {}", id, e);
                        }
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    client_id: usize,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf: Vec<u8> = Vec::new();

    write_half.write_all(format!("{}\n", hello()).as_bytes()).await?;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            debug!("Client {} closed connection", client_id);
            return Ok(());
        }

        // invalid UTF-8 still gets an answer (an unknown command)
        let raw = String::from_utf8_lossy(&buf);
        let line = raw.trim_end_matches(&['\n', '\r'][..]);
        info!("Client {} sent: {}", client_id, line);

        let response = dispatcher.handle_line(line).await;
        write_half.write_all(response.encode().as_bytes()).await?;
    }
}
