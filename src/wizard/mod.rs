//! The wizard engine: state store, sequencer, validation, conditional
//! sections, cooldowns, payload finalization and the session tying them
//! together.

pub mod conditions;
pub mod cooldown;
pub mod documents;
pub mod finalize;
pub mod flow;
pub mod schema;
pub mod sequencer;
pub mod session;
pub mod store;
pub mod value;

pub use conditions::{ActiveGroups, ConditionTable, ConditionalRule, Predicate};
pub use cooldown::{Channel, ResendCooldowns};
pub use documents::{DocumentSet, DocumentSlot, FileRef, MediaType};
pub use finalize::{finalize, Endpoint, PayloadContract, SubmissionPayload};
pub use flow::{FlowDefinition, FlowKind, RemoteCheck, StepDefinition, StepId};
pub use schema::{FieldDescriptor, FieldKind, Rule, StepSchema, StepValidator};
pub use sequencer::{Advance, SequencerError, StepSequencer};
pub use session::{
    Completion, DispatchEffect, PendingDispatch, Settled, StepOutcome, Wizard, WizardAction,
};
pub use store::{FormStore, StoreEvent, SubscriptionId};
pub use value::{FieldValue, WizardState};
