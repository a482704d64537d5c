//! Client side: the [`SftpClient`] façade, the lifecycle gating it and the
//! values it hands out.

pub mod error;
pub mod fs;
pub mod lifecycle;
mod session;

pub use session::SftpClient;
