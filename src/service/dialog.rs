//! Conversational state for multi-step staff prompts
//!
//! The UI shell collects punishment arguments over several messages
//! ("who?", "how long?", "why?"). Each in-flight conversation is an
//! explicit state machine keyed by `(user_id, private_chat_id)`, one per
//! user. The machine only collects strings; executing the finished command
//! is the shell's job.

use std::collections::HashMap;

use tokio::sync::Mutex;

const PROMPT_TARGET: &str = "Укажите пользователя (id или @username):";
const PROMPT_DURATION: &str = "Укажите срок (например 30m, 7d или «Навсегда»):";
const PROMPT_REASON: &str = "Укажите причину:";
const PROMPT_SEARCH: &str = "Введите id или @username для поиска:";
const PROMPT_FILTER: &str = "Введите слово:";
const PROMPT_REPORT_REASON: &str = "Опишите причину жалобы:";
const REPLY_CANCELLED: &str = "Действие отменено.";

/// Cancel words accepted at any step.
fn is_cancel(input: &str) -> bool {
    matches!(input.trim(), "/cancel" | "Отмена" | "отмена")
}

/// Punishment family a conversation is collecting arguments for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunishAction {
    Ban,
    Unban,
    EditBan,
    Mute,
    Unmute,
    EditMute,
    Warn,
    Unwarn,
    GlobalBan,
}

impl PunishAction {
    fn needs_duration(self) -> bool {
        matches!(
            self,
            Self::Ban | Self::EditBan | Self::Mute | Self::EditMute
        )
    }

    fn needs_reason(self) -> bool {
        matches!(self, Self::Ban | Self::Mute | Self::Warn | Self::GlobalBan)
    }
}

/// Where a conversation currently stands. Collected arguments ride along
/// in the state so no closures are needed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DialogState {
    #[default]
    Idle,
    AwaitingTarget {
        action: PunishAction,
    },
    AwaitingDuration {
        action: PunishAction,
        target: String,
    },
    AwaitingReason {
        action: PunishAction,
        target: String,
        duration: Option<String>,
    },
    AwaitingSearch,
    AwaitingFilter {
        chat_id: i64,
        add: bool,
    },
    AwaitingReportUser {
        chat_id: i64,
    },
    AwaitingReportReason {
        chat_id: i64,
        target: String,
    },
    AwaitingRoleTarget {
        level: i64,
    },
}

/// A fully collected command, ready to hand to the operation façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogCommand {
    Punish {
        action: PunishAction,
        target: String,
        duration: Option<String>,
        reason: Option<String>,
    },
    Search {
        query: String,
    },
    Filter {
        chat_id: i64,
        add: bool,
        word: String,
    },
    Report {
        chat_id: i64,
        target: String,
        reason: String,
    },
    SetRole {
        target: String,
        level: i64,
    },
}

/// Result of feeding one message into a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    /// No conversation is active for this key
    NoDialog,
    /// The machine advanced; show this prompt next
    Prompt(&'static str),
    /// All arguments collected; the conversation is over
    Command(DialogCommand),
    /// The user cancelled; the conversation is over
    Cancelled(&'static str),
}

/// `(user_id, private_chat_id)`
pub type DialogKey = (i64, i64);

#[derive(Default)]
pub struct Dialogs {
    states: Mutex<HashMap<DialogKey, DialogState>>,
}

impl Dialogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a conversation. Any conversation already in
    /// flight for this key is discarded.
    pub async fn begin(&self, key: DialogKey, state: DialogState) -> &'static str {
        let prompt = match &state {
            DialogState::Idle => REPLY_CANCELLED,
            DialogState::AwaitingTarget { .. }
            | DialogState::AwaitingReportUser { .. }
            | DialogState::AwaitingRoleTarget { .. } => PROMPT_TARGET,
            DialogState::AwaitingDuration { .. } => PROMPT_DURATION,
            DialogState::AwaitingReason { .. } => PROMPT_REASON,
            DialogState::AwaitingSearch => PROMPT_SEARCH,
            DialogState::AwaitingFilter { .. } => PROMPT_FILTER,
            DialogState::AwaitingReportReason { .. } => PROMPT_REPORT_REASON,
        };

        let mut states = self.states.lock().await;
        if matches!(state, DialogState::Idle) {
            states.remove(&key);
        } else {
            states.insert(key, state);
        }

        prompt
    }

    /// Drop a conversation without a reply.
    pub async fn cancel(&self, key: DialogKey) {
        self.states.lock().await.remove(&key);
    }

    pub async fn is_active(&self, key: DialogKey) -> bool {
        self.states.lock().await.contains_key(&key)
    }

    /// Feed one message into the conversation for `key`.
    pub async fn handle(&self, key: DialogKey, input: &str) -> DialogOutcome {
        let mut states = self.states.lock().await;
        let Some(state) = states.remove(&key) else {
            return DialogOutcome::NoDialog;
        };

        if is_cancel(input) {
            return DialogOutcome::Cancelled(REPLY_CANCELLED);
        }

        let input = input.trim().to_string();
        match advance(state, input) {
            Step::Next(state, prompt) => {
                states.insert(key, state);
                DialogOutcome::Prompt(prompt)
            }
            Step::Done(command) => DialogOutcome::Command(command),
        }
    }
}

enum Step {
    Next(DialogState, &'static str),
    Done(DialogCommand),
}

fn advance(state: DialogState, input: String) -> Step {
    match state {
        // begin() never stores Idle and handle() removes before matching,
        // so this arm is unreachable in practice.
        DialogState::Idle => Step::Done(DialogCommand::Search { query: input }),

        DialogState::AwaitingTarget { action } => {
            if action.needs_duration() {
                Step::Next(
                    DialogState::AwaitingDuration {
                        action,
                        target: input,
                    },
                    PROMPT_DURATION,
                )
            } else if action.needs_reason() {
                Step::Next(
                    DialogState::AwaitingReason {
                        action,
                        target: input,
                        duration: None,
                    },
                    PROMPT_REASON,
                )
            } else {
                Step::Done(DialogCommand::Punish {
                    action,
                    target: input,
                    duration: None,
                    reason: None,
                })
            }
        }

        DialogState::AwaitingDuration { action, target } => {
            if action.needs_reason() {
                Step::Next(
                    DialogState::AwaitingReason {
                        action,
                        target,
                        duration: Some(input),
                    },
                    PROMPT_REASON,
                )
            } else {
                Step::Done(DialogCommand::Punish {
                    action,
                    target,
                    duration: Some(input),
                    reason: None,
                })
            }
        }

        DialogState::AwaitingReason {
            action,
            target,
            duration,
        } => Step::Done(DialogCommand::Punish {
            action,
            target,
            duration,
            reason: Some(input),
        }),

        DialogState::AwaitingSearch => Step::Done(DialogCommand::Search { query: input }),

        DialogState::AwaitingFilter { chat_id, add } => Step::Done(DialogCommand::Filter {
            chat_id,
            add,
            word: input,
        }),

        DialogState::AwaitingReportUser { chat_id } => Step::Next(
            DialogState::AwaitingReportReason {
                chat_id,
                target: input,
            },
            PROMPT_REPORT_REASON,
        ),

        DialogState::AwaitingReportReason { chat_id, target } => {
            Step::Done(DialogCommand::Report {
                chat_id,
                target,
                reason: input,
            })
        }

        DialogState::AwaitingRoleTarget { level } => Step::Done(DialogCommand::SetRole {
            target: input,
            level,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: DialogKey = (77, 77);

    #[tokio::test]
    async fn ban_collects_target_duration_and_reason() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(
                KEY,
                DialogState::AwaitingTarget {
                    action: PunishAction::Ban,
                },
            )
            .await;

        assert_eq!(
            dialogs.handle(KEY, "@violator").await,
            DialogOutcome::Prompt(PROMPT_DURATION)
        );
        assert_eq!(
            dialogs.handle(KEY, "30m").await,
            DialogOutcome::Prompt(PROMPT_REASON)
        );
        assert_eq!(
            dialogs.handle(KEY, "spam").await,
            DialogOutcome::Command(DialogCommand::Punish {
                action: PunishAction::Ban,
                target: "@violator".to_string(),
                duration: Some("30m".to_string()),
                reason: Some("spam".to_string()),
            })
        );

        // Conversation is over.
        assert_eq!(dialogs.handle(KEY, "x").await, DialogOutcome::NoDialog);
    }

    #[tokio::test]
    async fn unban_needs_only_a_target() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(
                KEY,
                DialogState::AwaitingTarget {
                    action: PunishAction::Unban,
                },
            )
            .await;

        assert_eq!(
            dialogs.handle(KEY, "12345").await,
            DialogOutcome::Command(DialogCommand::Punish {
                action: PunishAction::Unban,
                target: "12345".to_string(),
                duration: None,
                reason: None,
            })
        );
    }

    #[tokio::test]
    async fn editmute_skips_the_reason_step() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(
                KEY,
                DialogState::AwaitingTarget {
                    action: PunishAction::EditMute,
                },
            )
            .await;

        dialogs.handle(KEY, "@violator").await;
        assert_eq!(
            dialogs.handle(KEY, "7d").await,
            DialogOutcome::Command(DialogCommand::Punish {
                action: PunishAction::EditMute,
                target: "@violator".to_string(),
                duration: Some("7d".to_string()),
                reason: None,
            })
        );
    }

    #[tokio::test]
    async fn warn_skips_the_duration_step() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(
                KEY,
                DialogState::AwaitingTarget {
                    action: PunishAction::Warn,
                },
            )
            .await;

        assert_eq!(
            dialogs.handle(KEY, "@violator").await,
            DialogOutcome::Prompt(PROMPT_REASON)
        );
    }

    #[tokio::test]
    async fn cancel_word_aborts_any_step() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(
                KEY,
                DialogState::AwaitingTarget {
                    action: PunishAction::Ban,
                },
            )
            .await;
        dialogs.handle(KEY, "@violator").await;

        assert_eq!(
            dialogs.handle(KEY, "Отмена").await,
            DialogOutcome::Cancelled(REPLY_CANCELLED)
        );
        assert!(!dialogs.is_active(KEY).await);
    }

    #[tokio::test]
    async fn new_conversation_replaces_the_old_one() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(
                KEY,
                DialogState::AwaitingTarget {
                    action: PunishAction::Ban,
                },
            )
            .await;
        dialogs.begin(KEY, DialogState::AwaitingSearch).await;

        assert_eq!(
            dialogs.handle(KEY, "@someone").await,
            DialogOutcome::Command(DialogCommand::Search {
                query: "@someone".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn report_flow_carries_the_chat() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(KEY, DialogState::AwaitingReportUser { chat_id: -1001 })
            .await;

        dialogs.handle(KEY, "@offender").await;
        assert_eq!(
            dialogs.handle(KEY, "insults").await,
            DialogOutcome::Command(DialogCommand::Report {
                chat_id: -1001,
                target: "@offender".to_string(),
                reason: "insults".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn conversations_are_isolated_per_key() {
        let dialogs = Dialogs::new();
        dialogs
            .begin(
                (1, 1),
                DialogState::AwaitingTarget {
                    action: PunishAction::Warn,
                },
            )
            .await;

        assert_eq!(dialogs.handle((2, 2), "hi").await, DialogOutcome::NoDialog);
        assert!(dialogs.is_active((1, 1)).await);
    }
}
