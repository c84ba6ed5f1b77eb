use crate::resp::RespValue;

/// Every error a command can produce. The `Display` text is exactly what is
/// sent back on the wire after the leading `-`.
#[derive(Debug, thiserror::Error)]
pub enum ShardisError {
    #[error("ERR {0}")]
    Generic(String),

    #[error("ERR protocol error: '{0}'")]
    Protocol(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR min or max is not a float")]
    InvalidBorder,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpire(String),

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR value is out of range")]
    OutOfRange,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR invalid DB index")]
    InvalidDbIndex,

    #[error("ERR cluster: {0}")]
    Cluster(String),

    #[error("ERR unknown")]
    Unknown,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShardisError {
    pub fn to_resp_error(&self) -> String {
        match self {
            ShardisError::Io(e) => format!("ERR {e}"),
            other => other.to_string(),
        }
    }
}

impl From<ShardisError> for RespValue {
    fn from(err: ShardisError) -> Self {
        RespValue::Error(err.to_resp_error())
    }
}

pub type ShardisResult<T> = Result<T, ShardisError>;
