//! One-shot confirmation prompts.
//!
//! A prompt is created `Pending` and leaves that state exactly once, to
//! `Confirmed`, `Cancelled` or `TimedOut`. The transition happens under the
//! prompt's own lock, so however many answers race in, at most one of them
//! claims the bound action.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use proxbot_common::{MachineRef, PowerAction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::reply::{Button, ButtonStyle, PromptView};
use crate::{DispatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Confirm,
    Cancel,
    Start,
    Reboot,
    Shutdown,
}

impl Choice {
    /// Power action behind a machine-control button.
    pub fn power_action(&self) -> Option<PowerAction> {
        match self {
            Choice::Start => Some(PowerAction::Start),
            Choice::Reboot => Some(PowerAction::Reboot),
            Choice::Shutdown => Some(PowerAction::Shutdown),
            Choice::Confirm | Choice::Cancel => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    Pending,
    Confirmed,
    Cancelled,
    TimedOut,
}

/// What a prompt does when it is answered.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptAction {
    /// Hard stop. The id is resolved again when confirmed.
    ForceStop { vmid: u32 },
    Rollback { target: MachineRef, snapshot: String },
    /// Start / reboot / shutdown buttons attached to an info card.
    ControlPanel { target: MachineRef, running: bool },
}

impl PromptAction {
    fn buttons(&self) -> Vec<Button> {
        fn button(choice: Choice, label: &str, style: ButtonStyle, disabled: bool) -> Button {
            Button {
                choice,
                label: label.to_string(),
                style,
                disabled,
            }
        }

        match self {
            PromptAction::ForceStop { .. } => vec![
                button(Choice::Confirm, "Confirm Force Stop", ButtonStyle::Danger, false),
                button(Choice::Cancel, "Cancel", ButtonStyle::Secondary, false),
            ],
            PromptAction::Rollback { .. } => vec![
                button(Choice::Confirm, "Confirm Rollback", ButtonStyle::Danger, false),
                button(Choice::Cancel, "Cancel", ButtonStyle::Secondary, false),
            ],
            PromptAction::ControlPanel { running, .. } => vec![
                button(Choice::Start, "Start", ButtonStyle::Success, *running),
                button(Choice::Reboot, "Reboot", ButtonStyle::Primary, !*running),
                button(Choice::Shutdown, "Shutdown", ButtonStyle::Danger, !*running),
            ],
        }
    }
}

/// Outcome of a successful claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Cancelled { view: PromptView },
    Confirmed {
        action: PromptAction,
        choice: Choice,
        view: PromptView,
    },
}

#[derive(Debug)]
pub struct Prompt {
    action: PromptAction,
    view: PromptView,
    state: Mutex<PromptState>,
}

impl Prompt {
    pub fn state(&self) -> PromptState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enabled(&self, choice: Choice) -> bool {
        self.view
            .button(choice)
            .map(|b| !b.disabled)
            .unwrap_or(false)
    }

    /// Moves `Pending` to `next`. Only the first caller succeeds.
    fn transition(&self, next: PromptState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != PromptState::Pending {
            return false;
        }
        *state = next;
        true
    }
}

/// Live prompts keyed by id. Answered or expired prompts are dropped.
#[derive(Clone, Default)]
pub struct PromptRegistry {
    prompts: Arc<DashMap<Uuid, Arc<Prompt>>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending prompt and arms its timeout. Must be called from
    /// within a tokio runtime.
    pub fn open(
        &self,
        action: PromptAction,
        message: impl Into<String>,
        timeout: Duration,
    ) -> PromptView {
        let id = Uuid::new_v4();
        let view = PromptView {
            id,
            message: message.into(),
            buttons: action.buttons(),
            timeout_secs: timeout.as_secs(),
        };
        let prompt = Arc::new(Prompt {
            action,
            view: view.clone(),
            state: Mutex::new(PromptState::Pending),
        });
        self.prompts.insert(id, prompt.clone());
        debug!(prompt_id = %id, timeout_secs = timeout.as_secs(), "Prompt opened");

        let prompts = Arc::clone(&self.prompts);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if prompt.transition(PromptState::TimedOut) {
                info!(prompt_id = %id, "Prompt timed out");
            }
            prompts.remove(&id);
        });

        view
    }

    /// Answers a prompt. Unknown, expired or already answered prompts yield
    /// [`DispatchError::PromptInactive`]; a choice the prompt does not offer
    /// yields [`DispatchError::ChoiceUnavailable`] and leaves it pending.
    pub fn claim(&self, id: Uuid, choice: Choice) -> Result<Claim> {
        let prompt = self
            .prompts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DispatchError::PromptInactive)?;

        // A control panel has no cancel button; it only expires.
        let next = match choice {
            Choice::Cancel if prompt.enabled(choice) => PromptState::Cancelled,
            _ if prompt.enabled(choice) => PromptState::Confirmed,
            _ => return Err(DispatchError::ChoiceUnavailable),
        };
        if !prompt.transition(next) {
            return Err(DispatchError::PromptInactive);
        }
        self.prompts.remove(&id);

        let view = prompt.view.clone().inert();
        Ok(match next {
            PromptState::Cancelled => Claim::Cancelled { view },
            _ => Claim::Confirmed {
                action: prompt.action.clone(),
                choice,
                view,
            },
        })
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Prompt>> {
        self.prompts.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
