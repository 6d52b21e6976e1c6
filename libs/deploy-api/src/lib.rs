//! Wire models for the deployment record and build APIs.
//!
//! The CLI talks to two services: the deployment record store, which tracks
//! every deploy attempt, and the builder, which turns an uploaded source
//! archive into an application version while streaming status frames back.

pub mod models;
