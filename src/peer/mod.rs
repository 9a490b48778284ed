//! Peer Logic
//!
//! Everything a peer needs besides the socket: the merged local view, the
//! authoritative simulation of its drive set, and its persisted identity.
//!
//! - `view`: Merging hub messages and packaging outgoing updates
//! - `sim`: Per-frame simulation of the avatar and driven hostiles
//! - `collaborators`: Rendering and input seams
//! - `profile`: Persisted identifier and display name

pub mod collaborators;
pub mod profile;
pub mod sim;
pub mod view;

pub use collaborators::{EntitySprite, InputSource, RenderSurface, StillInput, WanderInput};
pub use profile::{PeerProfile, ProfileError};
pub use sim::{CombatState, StepReport};
pub use view::{PeerView, ScoreReporter};
