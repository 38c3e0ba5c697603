mod cooldown;
mod event;
mod handoff;
mod memory;
mod session;

pub use cooldown::{ActionType, CooldownAction, NewCooldownAction};
pub use event::{Event, EventLevel, NewEvent};
pub use handoff::{CheckResult, Handoff};
pub use memory::{
    CONTRADICT_STEP, DEACTIVATE_THRESHOLD, DEFAULT_CONFIDENCE, Memory, NewMemory, REINFORCE_STEP,
    clamp_confidence,
};
pub use session::{AD_HOC_PROMPT_FILE, NewSession, Session, SessionStatus, Trigger};
