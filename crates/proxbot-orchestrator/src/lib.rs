//! Command dispatch and monitoring engine.
//!
//! Inbound operator commands enter through [`Dispatcher::handle`], pass the
//! [`AccessGate`], get their target resolved to a node and kind by the
//! [`ResourceResolver`] and reach the hypervisor through the [`CallBridge`].
//! Destructive actions park behind a one-shot prompt held by the
//! [`PromptRegistry`]. The [`Monitor`] runs on its own schedule and shares only
//! the [`Watchlist`] and the hypervisor handle with the dispatcher.

pub mod access;
pub mod bridge;
pub mod command;
pub mod dispatcher;
pub mod monitor;
pub mod prompt;
pub mod render;
pub mod reply;
pub mod resolver;
pub mod watchlist;

use proxbot_common::ProxbotError;
use thiserror::Error;

pub use proxbot_common as common;

pub use access::{AccessGate, InvocationContext, ACCESS_DENIED};
pub use bridge::{CallBridge, HypervisorHandle};
pub use command::{catalog, Command, CommandSpec, ParamKind, ParamSpec};
pub use dispatcher::{AutocompleteChoice, Dispatcher, DispatcherConfig};
pub use monitor::{AlertSink, LogAlertSink, Monitor, MONITOR_PERIOD};
pub use prompt::{Choice, PromptAction, PromptRegistry, PromptState};
pub use render::MetricsRenderer;
pub use reply::{Attachment, Button, ButtonStyle, Color, Embed, EmbedField, PromptView, Reply};
pub use resolver::ResourceResolver;
pub use watchlist::{InMemoryWatchlist, JsonFileWatchlist, Watchlist, WatchlistStorage};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("VMID {0} not found.")]
    MachineNotFound(u32),
    #[error("VMID {0} is already monitored.")]
    AlreadyMonitored(u32),
    #[error("VMID {0} is not monitored.")]
    NotMonitored(u32),
    #[error("This prompt is no longer active.")]
    PromptInactive,
    #[error("That action is not available for this prompt.")]
    ChoiceUnavailable,
    #[error(transparent)]
    Hypervisor(#[from] ProxbotError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
