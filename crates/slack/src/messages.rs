use serde::Serialize;

use goodpoint_core::{GrantReceipt, PointTransaction, ReversedGrant, TransactionId, UserId, UserTally};

/// Slash-command reply in the shape Slack expects back. `in_channel` makes
/// the reply visible to everyone in the channel, not only the sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlackMessage {
    pub response_type: &'static str,
    pub text: String,
}

impl SlackMessage {
    pub fn in_channel(text: impl Into<String>) -> Self {
        Self { response_type: "in_channel", text: text.into() }
    }
}

pub fn help_message() -> SlackMessage {
    SlackMessage::in_channel(
        "*Available commands*\n\
         • `/help_goodpoint` show this help\n\
         • `/give_goodpoint @someone <reason>` give one good point with a reason\n\
         • `/show_goodpoint_monthly_history` list this month's grants\n\
         • `/show_goodpoint_ranking` all-time good point ranking\n\
         • `/delete_goodpoint <grant-id>` take back a grant",
    )
}

pub fn grant_message(receipt: &GrantReceipt) -> SlackMessage {
    let transaction = &receipt.transaction;
    SlackMessage::in_channel(format!(
        "<@{}> gave a good point to <@{}>!\n\n\
         *Reason*\n{}\n\n\
         *Total points*\n{} pt\n\n\
         Grant id: `{}`",
        transaction.sender_id,
        transaction.receiver_id,
        transaction.reason,
        receipt.total,
        transaction.id,
    ))
}

pub fn reversal_message(actor: &UserId, reversed: &ReversedGrant) -> SlackMessage {
    SlackMessage::in_channel(format!(
        "<@{}> took back a good point from <@{}>.\n\n\
         *Reason of the reversed grant*\n{}",
        actor, reversed.transaction.receiver_id, reversed.transaction.reason,
    ))
}

pub fn nothing_to_undo_message(id: &TransactionId) -> SlackMessage {
    SlackMessage::in_channel(format!("No grant with id `{id}` exists; nothing to undo."))
}

pub fn ranking_message(tallies: &[UserTally]) -> SlackMessage {
    if tallies.is_empty() {
        return SlackMessage::in_channel("No good points have been granted yet.");
    }

    let mut text = String::from("*Good point ranking*\n\n");
    for (index, tally) in tallies.iter().enumerate() {
        text.push_str(&format!("#{} <@{}>: {} pt\n", index + 1, tally.user_id, tally.points));
    }
    text.push_str("\nThank you all! :clap:");
    SlackMessage::in_channel(text)
}

pub fn history_message(transactions: &[PointTransaction]) -> SlackMessage {
    if transactions.is_empty() {
        return SlackMessage::in_channel("No good points were granted this month.");
    }

    let mut text = String::from("*Monthly grant history*\n");
    for transaction in transactions {
        text.push_str(&format!(
            "{}  <@{}> to <@{}>: \"{}\" (grant id = {})\n",
            transaction.created_at.format("%Y/%m/%d"),
            transaction.sender_id,
            transaction.receiver_id,
            transaction.reason,
            transaction.id,
        ));
    }
    SlackMessage::in_channel(text)
}
