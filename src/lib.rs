pub mod blobs;
pub mod config;
pub mod enrich;
pub mod entities;
pub mod extractor;
pub mod feeds;
pub mod fetch;
pub mod images;
pub mod jobs;
pub mod poller;
pub mod render;
pub mod sanitize;
pub mod scoring;
pub mod store;
