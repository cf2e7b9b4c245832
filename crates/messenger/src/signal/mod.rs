//! Signal via a `signal-cli` daemon speaking newline-delimited JSON-RPC over TCP.

pub mod events;
pub mod listener;
pub mod rpc;
pub mod sender;

pub use events::{parse_line, SignalEnvelope, SignalEvent};
pub use listener::{ReconnectPolicy, SignalListener, SignalTransport, TransportError};
pub use rpc::{RpcError, SignalRpcClient, TcpSignalTransport};
pub use sender::SignalSender;
