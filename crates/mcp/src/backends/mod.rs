//! Demo backends served by the `tether-mcp` and `tether-server` binaries.
//!
//! Each backend is only a [`Dispatcher`] populated with handlers; the
//! protocol machinery does not depend on any of them.

pub mod echo;
pub mod remote;
pub mod search;
pub mod sql;

use crate::dispatcher::Dispatcher;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Echo,
    Sql,
    Search,
    Remote,
}

impl Backend {
    pub fn dispatcher(self) -> Dispatcher {
        match self {
            Self::Echo => echo::dispatcher(),
            Self::Sql => sql::dispatcher(),
            Self::Search => search::dispatcher(),
            Self::Remote => remote::dispatcher(),
        }
    }
}
