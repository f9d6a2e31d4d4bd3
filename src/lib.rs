//! Qubic Radar is a blockchain monitoring service for the Qubic network: it
//! ingests webhook events, evaluates user-defined rules and AI detections,
//! tracks incidents and routes notifications to the user's channels.

pub mod config;
pub mod detection;
pub mod engine;
pub mod http_client;
pub mod http_server;
pub mod models;
pub mod normalizer;
pub mod notification;
pub mod persistence;
