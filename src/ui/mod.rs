//! Presentation helpers shared by every surface that shows a reply or a note.

pub mod markdown;
