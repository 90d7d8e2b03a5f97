//! Entity module - `SeaORM` entity definitions for the database backend.
//! The portal stores whole JSON documents, so a single generic table suffices.

pub mod document;

pub use document::{Column as DocumentColumn, Entity as Document, Model as DocumentModel};
