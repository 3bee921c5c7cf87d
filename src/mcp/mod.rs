

pub mod server;

pub use server::{DestinyRagMcpServer, build_collaborators, run_server};
