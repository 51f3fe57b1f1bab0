pub mod channel;
pub mod chart;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use channel::PresenceBus;
pub use chart::{ChartBar, ChartSpec, RenderedChart, Rgb};
pub use error::{Result, VoiceTallyError};
pub use event::{PresenceEvent, Transition};
pub use traits::{ChannelRegistry, ChartRenderer, LabelResolver, SessionStore};
pub use types::{ChannelUserSession, RankedTotal, StatKind, DEFAULT_TOP_LIMIT, MS_PER_HOUR};
