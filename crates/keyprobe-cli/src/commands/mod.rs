pub mod chat;
pub mod list;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use keyprobe_shared::ProviderId;
use std::process::ExitCode;

/// Accepts only known provider names so typos fail as usage errors
pub(crate) fn provider_parser() -> impl TypedValueParser<Value = ProviderId> {
    PossibleValuesParser::new(ProviderId::ALL.map(ProviderId::as_str))
        .try_map(|name| name.parse::<ProviderId>())
}

pub(crate) fn exit_code(succeeded: bool) -> ExitCode {
    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
