//! Integration test modules

mod chat;
mod credentials;
mod pricing;
mod recovery;
