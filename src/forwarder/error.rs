// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Seek store error: {0}")]
    SeekStore(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Directory not available: {0}")]
    Directory(PathBuf),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Task failure: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;
