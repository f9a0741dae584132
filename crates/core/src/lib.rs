//! Core logic of a chat session: threads, transcripts, attachments and the
//! streamed query flow, coordinated by a session controller.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod attachment;
mod backend;
mod error;
mod notice;
mod query_client;
mod session;
mod thread;
mod transcript;

pub use attachment::{
    Attachment, AttachmentStatus, SUPPORTED_EXTENSIONS, Validation,
    is_supported, validate,
};
pub use error::Error;
pub use notice::{Notice, NoticeKind};
pub use session::{
    DeleteConfirmation, SessionBuilder, SessionController, SessionSnapshot,
    ViewState,
};
pub use thread::{DEFAULT_THREAD_ID, Thread};
pub use transcript::{
    DEFAULT_HISTORY_LIMIT, Message, MessageStatus, TranscriptStore,
};
