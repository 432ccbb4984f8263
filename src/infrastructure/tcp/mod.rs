// TCP module - TCP client transport and a local echo server
pub mod handler;
pub mod server;

pub use handler::TcpHandler;
pub use server::EchoServer;
