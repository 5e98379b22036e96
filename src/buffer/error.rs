// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Invalid buffer configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BufferError>;
