//! Caching reverse proxy for a beacon node's committees endpoint.
//!
//! Responses for `/eth/v1/beacon/states/head/committees?epoch=N` are stored
//! once per epoch under the data directory and served from there afterwards;
//! every other request is forwarded to the upstream unchanged.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
