use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use goodpoint_core::chrono::{DateTime, Datelike, TimeZone, Utc};
use goodpoint_core::{
    GrantReceipt, LedgerError, PointTransaction, ReversedGrant, TransactionId, UserId, UserTally,
};

use crate::messages::{self, SlackMessage};

pub const COMMAND_HELP: &str = "/help_goodpoint";
pub const COMMAND_GIVE: &str = "/give_goodpoint";
pub const COMMAND_SHOW_HISTORY: &str = "/show_goodpoint_monthly_history";
pub const COMMAND_SHOW_RANKING: &str = "/show_goodpoint_ranking";
pub const COMMAND_DELETE: &str = "/delete_goodpoint";

/// How many users the ranking reply shows.
pub const RANKING_LIMIT: u32 = 10;

/// Raw slash-command fields as Slack posts them, already form-decoded and
/// token-verified by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
}

/// The closed set of operations a slash command can ask for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PointCommand {
    Help,
    Give { receiver: UserId, reason: String },
    Ranking,
    MonthlyHistory,
    Delete { transaction_id: TransactionId },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("could not extract a mention and reason from `{text}`")]
    MalformedGive { text: String },
    #[error("a grant id is required to delete a grant")]
    MissingTransactionId,
}

#[derive(Debug, Error)]
pub enum CommandRouteError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl CommandRouteError {
    /// True when the command itself was bad, as opposed to the ledger
    /// failing to execute a well-formed one.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Parse(_) => true,
            Self::Ledger(error) => error.is_rejection(),
        }
    }
}

pub fn parse_point_command(
    payload: &SlashCommandPayload,
) -> Result<PointCommand, CommandParseError> {
    match payload.command.as_str() {
        COMMAND_HELP => Ok(PointCommand::Help),
        COMMAND_GIVE => parse_give(&payload.text),
        COMMAND_SHOW_RANKING => Ok(PointCommand::Ranking),
        COMMAND_SHOW_HISTORY => Ok(PointCommand::MonthlyHistory),
        COMMAND_DELETE => {
            let id = payload.text.trim();
            if id.is_empty() {
                return Err(CommandParseError::MissingTransactionId);
            }
            Ok(PointCommand::Delete { transaction_id: TransactionId(id.to_string()) })
        }
        other => Err(CommandParseError::UnsupportedCommand(other.to_string())),
    }
}

fn mention_pattern() -> &'static Regex {
    // Slack escapes a mention as `<@U123ABC|display.name>`; the label part is
    // absent when escaping is configured without it.
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<@(U[A-Z0-9]+)(?:\|[^>]*)?>").expect("mention pattern is valid")
    })
}

fn parse_give(text: &str) -> Result<PointCommand, CommandParseError> {
    let Some(captures) = mention_pattern().captures(text) else {
        return Err(CommandParseError::MalformedGive { text: text.to_string() });
    };

    let receiver = UserId(captures[1].to_string());
    let reason = text.replacen(&captures[0], "", 1).trim().to_string();
    if reason.is_empty() {
        return Err(CommandParseError::MalformedGive { text: text.to_string() });
    }

    Ok(PointCommand::Give { receiver, reason })
}

/// Midnight on the first day of `now`'s month. The monthly window is a
/// dispatcher concern; the ledger takes any `since` value.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first day of the month is a valid timestamp")
}

/// What the dispatcher needs from the ledger. The server crate implements
/// this over the real ledger service; tests substitute a stub.
#[async_trait]
pub trait PointCommandService: Send + Sync {
    async fn grant_point(
        &self,
        sender: UserId,
        receiver: UserId,
        reason: String,
    ) -> Result<GrantReceipt, LedgerError>;

    async fn reverse_grant(
        &self,
        id: TransactionId,
    ) -> Result<Option<ReversedGrant>, LedgerError>;

    async fn ranking(&self, limit: u32) -> Result<Vec<UserTally>, LedgerError>;

    async fn history_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PointTransaction>, LedgerError>;
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: PointCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        payload: SlashCommandPayload,
    ) -> Result<SlackMessage, CommandRouteError> {
        let command = parse_point_command(&payload)?;
        tracing::info!(
            event_name = "slack.command.routed",
            command = %payload.command,
            user_id = %payload.user_id,
            "slash command routed"
        );

        let actor = UserId(payload.user_id);
        match command {
            PointCommand::Help => Ok(messages::help_message()),
            PointCommand::Give { receiver, reason } => {
                let receipt = self.service.grant_point(actor, receiver, reason).await?;
                Ok(messages::grant_message(&receipt))
            }
            PointCommand::Ranking => {
                let tallies = self.service.ranking(RANKING_LIMIT).await?;
                Ok(messages::ranking_message(&tallies))
            }
            PointCommand::MonthlyHistory => {
                let since = start_of_month(Utc::now());
                let transactions = self.service.history_since(since).await?;
                Ok(messages::history_message(&transactions))
            }
            PointCommand::Delete { transaction_id } => {
                match self.service.reverse_grant(transaction_id.clone()).await? {
                    Some(reversed) => Ok(messages::reversal_message(&actor, &reversed)),
                    None => Ok(messages::nothing_to_undo_message(&transaction_id)),
                }
            }
        }
    }
}
