// Data models for landmarks, posture classification and sessions

pub mod landmark;
pub mod posture;
pub mod session;
pub mod event;

pub use landmark::*;
pub use posture::*;
pub use session::*;
pub use event::*;
