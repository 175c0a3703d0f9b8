//! Per-tenant attachment storage: media downloaded from inbound messages and
//! history sync dumps, written under `files/user_<id>/`.

pub mod mime;
pub mod store;

pub use store::{AttachmentError, AttachmentStore};
