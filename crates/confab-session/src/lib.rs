//! Session orchestration for Confab
//!
//! Each recording session owns its own chunker, pipeline worker,
//! reconciler and assembler; stopping the session finalizes exactly
//! once and yields a [`confab_types::SessionRecord`] ready for a
//! [`SessionStore`].

pub mod session;
pub mod store;

pub use session::{Session, SessionConfig, SessionHandle};
pub use store::{default_sessions_dir, JsonSessionStore, SessionStore};
