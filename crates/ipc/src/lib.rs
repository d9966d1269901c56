pub mod handler;
pub mod pipe_server;
pub mod protocol;
pub mod shm;

#[cfg(test)]
pub(crate) mod test_support;

pub use handler::{HandlerError, RequestHandler};
pub use pipe_server::{PipeServer, ServerError, ServerState};
pub use protocol::{Command, ProtocolError, Response};
pub use shm::{ShmConnection, ShmError, ShmIngestor};
