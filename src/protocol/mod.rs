//! Data shapes exchanged with the transport: raw attributes as a server
//! reports them and the status codes its failures carry.

mod file_attrs;
mod status;

pub use self::{
    file_attrs::{FileAttributes, FileType},
    status::StatusCode,
};
