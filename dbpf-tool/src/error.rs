// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use dbpf_package::ResourceKey;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Package(#[from] dbpf_package::Error),

    #[error("{0}")]
    Data(#[from] dbpf_data::Error),

    #[error("bad value for {0}: {1}")]
    BadArgument(&'static str, String),

    #[error("resource {0} not found")]
    ResourceNotFound(ResourceKey),

    #[error("resource {0} is not a DATA resource")]
    NotDataResource(ResourceKey),

    #[error("unknown command")]
    UnknownCommand,
}
