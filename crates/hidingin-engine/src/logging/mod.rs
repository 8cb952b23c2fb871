//! Logging utilities.
//!
//! Every engine module logs through the `log` facade. This module only owns the
//! one-shot `env_logger` setup used by hosts such as the studio binary.

mod init;

pub use init::{LoggingConfig, init_logging};
