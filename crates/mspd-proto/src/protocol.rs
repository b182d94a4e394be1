use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protocol version announced in the greeting and returned by `version`.
/// Bump this when the line format or the command table changes.
pub const PROTOCOL_VERSION: &str = "1.1.0";

/// Greeting line written to every client right after it connects.
pub fn hello() -> String {
    format!("OK MSPD {}", PROTOCOL_VERSION)
}

/// Every command the daemon understands, in the order `help` lists them,
/// together with its arity (argument count, excluding the command name).
pub const COMMANDS: &[(&str, usize)] = &[
    ("version", 0),
    ("current", 0),
    ("play", 1),
    ("next", 0),
    ("prev", 0),
    ("stop", 0),
    ("volume", 2),
    ("help", 0),
    ("stations", 0),
    ("status", 0),
];

/// Response codes.
///
/// `1xx` success, `2xx` request-side errors, `3xx` server-side errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok,
    GeneralError,
    UnknownCommand,
    InvalidArgument,
    Syntax,
    InternalError,
    NotAvailable,
    OutOfRange,
}

impl Code {
    /// Highest code still reported as `OK`.
    pub const SUCCESS_THRESHOLD: u16 = 100;

    pub fn value(self) -> u16 {
        match self {
            Code::Ok => 100,
            Code::GeneralError => 200,
            Code::UnknownCommand => 201,
            Code::InvalidArgument => 202,
            Code::Syntax => 203,
            Code::InternalError => 300,
            Code::NotAvailable => 301,
            Code::OutOfRange => 302,
        }
    }

    pub fn from_value(value: u16) -> Option<Self> {
        let code = match value {
            100 => Code::Ok,
            200 => Code::GeneralError,
            201 => Code::UnknownCommand,
            202 => Code::InvalidArgument,
            203 => Code::Syntax,
            300 => Code::InternalError,
            301 => Code::NotAvailable,
            302 => Code::OutOfRange,
            _ => return None,
        };
        Some(code)
    }

    /// Message used on the `ERROR` line when the reply carries none.
    pub fn default_message(self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::GeneralError => "error",
            Code::UnknownCommand => "unknown command",
            Code::InvalidArgument => "invalid argument",
            Code::Syntax => "incorrect syntax",
            Code::InternalError => "internal server error",
            Code::NotAvailable => "requested property not available",
            Code::OutOfRange => "number out of range",
        }
    }

    pub fn is_success(self) -> bool {
        self.value() <= Self::SUCCESS_THRESHOLD
    }
}

/// Result half of a dispatched request.  Rendered as the trailing status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: Code,
    pub message: String,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
        }
    }

    pub fn error(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error reply that falls back to the code's default message.
    pub fn bare(code: Code) -> Self {
        Self::error(code, String::new())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_success() {
            return write!(f, "OK {}", self.code.value());
        }
        let message = if self.message.is_empty() {
            self.code.default_message()
        } else {
            &self.message
        };
        write!(f, "ERROR {} {}", self.code.value(), message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeVerb {
    Set,
    Inc,
    Dec,
}

impl VolumeVerb {
    /// Argument passed to the volume command.
    pub fn as_arg(self) -> &'static str {
        match self {
            VolumeVerb::Set => "set",
            VolumeVerb::Inc => "inc",
            VolumeVerb::Dec => "dec",
        }
    }
}

impl FromStr for VolumeVerb {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(VolumeVerb::Set),
            "inc" => Ok(VolumeVerb::Inc),
            "dec" => Ok(VolumeVerb::Dec),
            other => Err(RequestError::InvalidArgument(other.to_string())),
        }
    }
}

/// A validated client request.  Arity and argument types are checked once in
/// [`Request::parse`]; range checks that need the station registry happen at
/// dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Version,
    Current,
    Play { station_id: i64 },
    Next,
    Prev,
    Stop,
    Volume { verb: VolumeVerb, amount: i64 },
    Help,
    Stations,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Unknown command '{0}'.")]
    UnknownCommand(String),
    #[error("Wrong number of arguments. '{command}' takes {arity} arguments.")]
    Syntax { command: String, arity: usize },
    #[error("Invalid argument '{0}'.")]
    InvalidArgument(String),
}

impl RequestError {
    pub fn code(&self) -> Code {
        match self {
            RequestError::UnknownCommand(_) => Code::UnknownCommand,
            RequestError::Syntax { .. } => Code::Syntax,
            RequestError::InvalidArgument(_) => Code::InvalidArgument,
        }
    }

    pub fn reply(&self) -> Reply {
        Reply::error(self.code(), self.to_string())
    }
}

/// Arity of a known command, or `None` for an unknown one.
pub fn arity(command: &str) -> Option<usize> {
    COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, arity)| *arity)
}

impl Request {
    /// Parse one request line.  Tokens are separated by single spaces, so
    /// doubled spaces produce empty tokens and therefore an arity error.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let tokens: Vec<&str> = line.split(' ').collect();
        let command = tokens[0];

        let arity = arity(command)
            .ok_or_else(|| RequestError::UnknownCommand(command.to_string()))?;
        if tokens.len() != arity + 1 {
            return Err(RequestError::Syntax {
                command: command.to_string(),
                arity,
            });
        }

        let request = match command {
            "version" => Request::Version,
            "current" => Request::Current,
            "play" => Request::Play {
                station_id: parse_int(tokens[1])?,
            },
            "next" => Request::Next,
            "prev" => Request::Prev,
            "stop" => Request::Stop,
            "volume" => {
                let amount = parse_int(tokens[2])?;
                let verb = tokens[1].parse()?;
                Request::Volume { verb, amount }
            }
            "help" => Request::Help,
            "stations" => Request::Stations,
            "status" => Request::Status,
            other => return Err(RequestError::UnknownCommand(other.to_string())),
        };
        Ok(request)
    }
}

fn parse_int<T: FromStr>(token: &str) -> Result<T, RequestError> {
    token
        .parse()
        .map_err(|_| RequestError::InvalidArgument(token.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Station {
    pub name: String,
    pub url: String,
}

/// Current-playback snapshot.  `volume` is -1 when the volume command could
/// not be queried; `curr_station_id` 0 means nothing is playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub volume: i32,
    pub curr_station_id: usize,
    pub tag: String,
}

impl Status {
    pub fn stopped() -> Self {
        Self {
            volume: -1,
            curr_station_id: 0,
            tag: String::new(),
        }
    }

    /// Multi-line block returned by the `status` command.
    pub fn render(&self, station: Option<&Station>) -> String {
        let (name, url) = station
            .map(|s| (s.name.as_str(), s.url.as_str()))
            .unwrap_or(("", ""));
        format!(
            "station: {}\nurl: {}\nid: {}\ntag: {}\nvolume: {}",
            name, url, self.curr_station_id, self.tag, self.volume
        )
    }
}

// ── client side ───────────────────────────────────────────────────────────────

/// True for the line that terminates a response.
pub fn is_response_end(line: &str) -> bool {
    line.starts_with("OK ") || line.starts_with("ERROR ")
}

/// Decoded trailing status line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid response line '{0}'")]
pub struct InvalidResponse(pub String);

impl StatusLine {
    pub fn is_ok(&self) -> bool {
        self.code <= Code::SUCCESS_THRESHOLD
    }
}

impl FromStr for StatusLine {
    type Err = InvalidResponse;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidResponse(line.to_string());
        let mut parts = line.splitn(3, ' ');
        let head = parts.next().ok_or_else(invalid)?;
        let code: u16 = parts
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(invalid)?;
        let rest = parts.next().map(str::to_string);

        match head {
            "OK" => Ok(Self {
                code,
                message: rest,
            }),
            "ERROR" => Ok(Self {
                code,
                message: rest.or_else(|| {
                    Code::from_value(code).map(|c| c.default_message().to_string())
                }),
            }),
            _ => Err(invalid()),
        }
    }
}
