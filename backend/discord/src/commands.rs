//! `/voicestats` slash command definition and interaction helpers.

use serenity::all::{CommandInteraction, CommandOptionType, CreateCommand, CreateCommandOption};

use voicetally_core::StatKind;
use voicetally_reports::{FailureClass, Messages};

pub const COMMAND_NAME: &str = "voicestats";
pub const KIND_OPTION: &str = "type";

/// Discord error code for an interaction token that is unknown or expired.
const UNKNOWN_INTERACTION: isize = 10062;

/// Global command registered on startup.
pub fn voicestats_command(messages: &Messages) -> CreateCommand {
    CreateCommand::new(COMMAND_NAME)
        .description(messages.command_description())
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                KIND_OPTION,
                messages.kind_option_description(),
            )
            .required(true)
            .add_string_choice(messages.kind_choice(StatKind::Channel), StatKind::Channel.as_str())
            .add_string_choice(messages.kind_choice(StatKind::User), StatKind::User.as_str()),
        )
}

/// The `type` option of a `/voicestats` invocation.
pub fn requested_kind(command: &CommandInteraction) -> Option<StatKind> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == KIND_OPTION)
        .and_then(|opt| opt.value.as_str())
        .and_then(|value| value.parse().ok())
}

/// Retry classification for interaction acknowledgment failures.
pub fn classify_error(err: &serenity::Error) -> FailureClass {
    match err {
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp)) => {
            classify_response(Some(resp.status_code.as_u16()), Some(resp.error.code))
        }
        serenity::Error::Http(serenity::http::HttpError::Request(_)) => FailureClass::Transient,
        _ => FailureClass::Permanent,
    }
}

/// Unknown-interaction (10062) and 503 responses are worth another attempt.
pub fn classify_response(status: Option<u16>, code: Option<isize>) -> FailureClass {
    if code == Some(UNKNOWN_INTERACTION) || status == Some(503) {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    }
}
