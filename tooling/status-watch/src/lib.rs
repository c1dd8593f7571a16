pub mod alerter;
pub mod config;
pub mod feed;
pub mod models;
pub mod service;
pub mod storage;
pub mod tracker;
