use std::fmt::Display;

use derive_more::derive::{Deref, From};
use serde::{Deserialize, Serialize};

pub mod codec;
pub mod domain;
pub mod msg;
pub mod time;

/// Block height. The remote signer keeps a watermark of this type below which
/// it refuses to produce new signatures.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, From, Deref, Clone, Copy, Serialize, Deserialize)]
pub struct Height(u64);

impl Display for Height {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

impl Height {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Hash, PartialEq, Eq, From, Deref, Clone, Serialize, Deserialize)]
pub struct ChainId(String);

impl From<&str> for ChainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
