pub mod node;
pub mod server;
pub mod sync;

pub use node::{Peer, PeerDirectory};
pub use server::Server;
pub use sync::Package;
