// Error taxonomy
pub mod error;

// Startup configuration
pub mod config;

// Encrypted per-device credential storage
pub mod credentials;

// Authorization flow, state tokens and access gate
pub mod auth;

// Remote search and playback API
pub mod spotify;

// Speech-to-text for audio commands
pub mod transcription;

// Command interpretation and execution
pub mod commands;

// HTTP API
pub mod api;
