//! Request routing: one line in, one [`Response`] out.
//!
//! Parsing and arity checks live in [`Request::parse`]; this module resolves
//! station indices against the registry and turns backend failures into
//! protocol error codes.  Nothing here panics on client input.

use crate::core::{DaemonCore, StepError};
use crate::player::PlayerError;
use crate::volume::VolumeError;
use mspd_proto::protocol::{Code, Reply, Request, VolumeVerb, COMMANDS, PROTOCOL_VERSION};
use std::sync::Arc;
use tracing::{debug, warn};

/// Payload plus trailing status line.  The payload is only written when
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub payload: String,
    pub reply: Reply,
}

impl Response {
    fn ok() -> Self {
        Self::with_payload(String::new())
    }

    fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            reply: Reply::ok(),
        }
    }

    fn error(reply: Reply) -> Self {
        Self {
            payload: String::new(),
            reply,
        }
    }

    /// Wire form, every line newline-terminated.
    pub fn encode(&self) -> String {
        if self.payload.is_empty() {
            format!("{}\n", self.reply)
        } else {
            format!("{}\n{}\n", self.payload, self.reply)
        }
    }
}

pub struct Dispatcher {
    core: Arc<DaemonCore>,
}

impl Dispatcher {
    pub fn new(core: Arc<DaemonCore>) -> Self {
        Self { core }
    }

    pub async fn handle_line(&self, line: &str) -> Response {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected request '{}': {}", line, e);
                return Response::error(e.reply());
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Version => Response::with_payload(PROTOCOL_VERSION),
            Request::Current => self.current().await,
            Request::Play { station_id } => self.play(station_id).await,
            Request::Next => self.step(1).await,
            Request::Prev => self.step(-1).await,
            Request::Stop => self.stop().await,
            Request::Volume { verb, amount } => self.volume(verb, amount).await,
            Request::Help => self.help(),
            Request::Stations => self.stations(),
            Request::Status => self.status().await,
        }
    }

    async fn current(&self) -> Response {
        match self.core.now_playing().await {
            Ok(now) => Response::with_payload(now.tag),
            Err(e) => Response::error(Reply::error(Code::GeneralError, e.to_string())),
        }
    }

    async fn play(&self, station_id: i64) -> Response {
        let count = self.core.registry().station_count();
        let index = match usize::try_from(station_id) {
            Ok(i) if i >= 1 && i < count => i,
            _ => {
                debug!("play {} out of range 1..{}", station_id, count);
                return Response::error(Reply::bare(Code::OutOfRange));
            }
        };
        match self.core.play(index).await {
            Ok(_) => Response::ok(),
            Err(e) => Response::error(player_failure(e)),
        }
    }

    async fn step(&self, delta: i64) -> Response {
        match self.core.step(delta).await {
            Ok(_) => Response::ok(),
            Err(e @ StepError::NoStations) => {
                Response::error(Reply::error(Code::NotAvailable, e.to_string()))
            }
            Err(StepError::Status(e)) => Response::error(Reply::error(
                Code::GeneralError,
                format!("Could not get status: {}", e),
            )),
            Err(StepError::Player(e)) => Response::error(player_failure(e)),
        }
    }

    async fn stop(&self) -> Response {
        match self.core.stop().await {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(player_failure(e)),
        }
    }

    async fn volume(&self, verb: VolumeVerb, amount: i64) -> Response {
        match self.core.volume().apply(verb, amount).await {
            Ok(()) => Response::ok(),
            Err(e) => {
                warn!("volume {} {} failed: {}", verb.as_arg(), amount, e);
                Response::error(volume_failure(e))
            }
        }
    }

    fn help(&self) -> Response {
        let names: Vec<&str> = COMMANDS.iter().map(|(name, _)| *name).collect();
        Response::with_payload(names.join("\n"))
    }

    fn stations(&self) -> Response {
        let lines: Vec<String> = self
            .core
            .registry()
            .playable()
            .map(|(i, station)| format!("{} {}", i, station.name))
            .collect();
        Response::with_payload(lines.join("\n"))
    }

    async fn status(&self) -> Response {
        match self.core.status().await {
            Ok(status) => {
                let station = self.core.registry().station_at(status.curr_station_id);
                Response::with_payload(status.render(station))
            }
            Err(e) => Response::error(Reply::error(Code::GeneralError, e.to_string())),
        }
    }
}

fn player_failure(e: PlayerError) -> Reply {
    warn!("Playback request failed: {}", e);
    match e {
        PlayerError::UnknownStation(_) => Reply::bare(Code::OutOfRange),
        other => Reply::error(Code::GeneralError, other.to_string()),
    }
}

fn volume_failure(e: VolumeError) -> Reply {
    if e.is_timeout() {
        Reply::error(Code::InternalError, e.to_string())
    } else {
        Reply::error(Code::GeneralError, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_skips_empty_payload() {
        assert_eq!(Response::ok().encode(), "OK 100\n");
        assert_eq!(
            Response::with_payload("1.1.0").encode(),
            "1.1.0\nOK 100\n"
        );
        assert_eq!(
            Response::error(Reply::bare(Code::Syntax)).encode(),
            "ERROR 203 incorrect syntax\n"
        );
    }
}
