//! End-to-end gateway tests.

mod auth;
mod codec_properties;
mod crud;
mod filters;
mod protocol;
