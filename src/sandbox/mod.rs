//! Secure execution sandboxes
//!
//! One Docker-backed workspace container per session. The container is the
//! only place agent commands run; the host only ever touches the session
//! workspace directory.

mod container;

pub use container::WorkspaceContainer;
